//! Subscription storage.
//!
//! [`SubscriptionStore`] is the persistence seam: the engine only ever reads
//! subscriptions through it, so a key-value or relational backend can replace
//! the in-memory default without touching delivery code. Instances are
//! constructed explicitly and injected; there is no process-wide singleton.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::WebhookError;
use crate::types::{CreateSubscription, Subscription, SubscriptionFilter, UpdateSubscription};

/// CRUD storage for subscriptions plus the event-matching read path.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn create(&self, input: CreateSubscription) -> Result<Subscription, WebhookError>;

    /// Apply a partial update. The id is immutable; unknown ids are an error.
    async fn update(
        &self,
        id: Uuid,
        changes: UpdateSubscription,
    ) -> Result<Subscription, WebhookError>;

    /// Returns true if a subscription was removed.
    async fn delete(&self, id: Uuid) -> Result<bool, WebhookError>;

    async fn get(&self, id: Uuid) -> Result<Option<Subscription>, WebhookError>;

    async fn list(&self, filter: SubscriptionFilter) -> Result<Vec<Subscription>, WebhookError>;

    /// Active subscriptions whose patterns match the event type.
    async fn matching(&self, event_type: &str) -> Result<Vec<Subscription>, WebhookError>;

    /// Whether the given subscription would receive this event type.
    /// Unknown or inactive subscriptions never deliver.
    async fn should_deliver(&self, id: Uuid, event_type: &str) -> Result<bool, WebhookError> {
        Ok(self
            .get(id)
            .await?
            .is_some_and(|sub| sub.matches(event_type)))
    }
}

/// Default in-memory backend.
pub struct InMemorySubscriptionStore {
    subscriptions: RwLock<HashMap<Uuid, Subscription>>,
}

impl InMemorySubscriptionStore {
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemorySubscriptionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SubscriptionStore for InMemorySubscriptionStore {
    async fn create(&self, input: CreateSubscription) -> Result<Subscription, WebhookError> {
        validate_endpoint_url(&input.endpoint_url)?;
        validate_event_types(&input.event_types)?;

        let subscription = Subscription {
            id: Uuid::new_v4(),
            endpoint_url: input.endpoint_url,
            event_types: input.event_types,
            secret: input.secret,
            active: true,
            created_at: Utc::now(),
            rate_limit: input.rate_limit,
        };

        self.subscriptions
            .write()
            .await
            .insert(subscription.id, subscription.clone());
        Ok(subscription)
    }

    async fn update(
        &self,
        id: Uuid,
        changes: UpdateSubscription,
    ) -> Result<Subscription, WebhookError> {
        if let Some(ref url) = changes.endpoint_url {
            validate_endpoint_url(url)?;
        }
        if let Some(ref event_types) = changes.event_types {
            validate_event_types(event_types)?;
        }

        let mut subscriptions = self.subscriptions.write().await;
        let sub = subscriptions
            .get_mut(&id)
            .ok_or(WebhookError::SubscriptionNotFound(id))?;

        if let Some(url) = changes.endpoint_url {
            sub.endpoint_url = url;
        }
        if let Some(event_types) = changes.event_types {
            sub.event_types = event_types;
        }
        if let Some(secret) = changes.secret {
            sub.secret = secret;
        }
        if let Some(active) = changes.active {
            sub.active = active;
        }
        if let Some(rate_limit) = changes.rate_limit {
            sub.rate_limit = Some(rate_limit);
        }

        Ok(sub.clone())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, WebhookError> {
        Ok(self.subscriptions.write().await.remove(&id).is_some())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Subscription>, WebhookError> {
        Ok(self.subscriptions.read().await.get(&id).cloned())
    }

    async fn list(&self, filter: SubscriptionFilter) -> Result<Vec<Subscription>, WebhookError> {
        let subscriptions = self.subscriptions.read().await;
        let mut items: Vec<Subscription> = subscriptions
            .values()
            .filter(|sub| filter.active.map_or(true, |want| sub.active == want))
            .cloned()
            .collect();
        items.sort_by_key(|sub| sub.created_at);
        Ok(items)
    }

    async fn matching(&self, event_type: &str) -> Result<Vec<Subscription>, WebhookError> {
        let subscriptions = self.subscriptions.read().await;
        let mut items: Vec<Subscription> = subscriptions
            .values()
            .filter(|sub| sub.matches(event_type))
            .cloned()
            .collect();
        items.sort_by_key(|sub| sub.created_at);
        Ok(items)
    }
}

fn validate_endpoint_url(url: &str) -> Result<(), WebhookError> {
    if url.starts_with("https://") || url.starts_with("http://") {
        Ok(())
    } else {
        Err(WebhookError::Validation(format!(
            "endpoint_url must be http(s): {url}"
        )))
    }
}

fn validate_event_types(event_types: &[String]) -> Result<(), WebhookError> {
    if event_types.is_empty() {
        return Err(WebhookError::Validation(
            "event_types must not be empty".to_string(),
        ));
    }
    for pattern in event_types {
        if !valid_pattern(pattern) {
            return Err(WebhookError::Validation(format!(
                "invalid event type pattern: {pattern:?}"
            )));
        }
    }
    Ok(())
}

/// Accepted forms: `*`, `prefix.*` with a non-empty prefix, or a plain dotted
/// name without embedded wildcards.
fn valid_pattern(pattern: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if let Some(prefix) = pattern.strip_suffix(".*") {
        return !prefix.is_empty() && !prefix.contains('*');
    }
    !pattern.is_empty() && !pattern.contains('*') && !pattern.contains(char::is_whitespace)
}
