//! Webhook delivery engine.
//!
//! Matches dispatched events to active subscriptions, gates each delivery on
//! the rate limiter, signs the canonical envelope bytes, POSTs to the
//! subscriber, retries failures with exponential backoff and jitter, and
//! appends every attempt to the delivery history.
//!
//! Dispatch fans out one spawned task per matching subscription; the producer
//! never waits out a subscriber's retry schedule, and a hung endpoint can only
//! delay its own retry sequence.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use reqwest::Client;
use uuid::Uuid;

use crate::config::{DeliveryConfig, WebhookConfig};
use crate::error::WebhookError;
use crate::history::DeliveryLog;
use crate::payload::Envelope;
use crate::rate_limit::RateLimiterRegistry;
use crate::registry::EventRegistry;
use crate::signature;
use crate::store::SubscriptionStore;
use crate::types::{
    DeliveryAttempt, DeliveryOutcome, DeliveryReport, DeliveryStats, DeliveryStatus,
    DispatchReceipt, Event, Subscription, SubscriptionHealth,
};

/// Header carrying the `sha256=<hex>` payload signature.
pub const SIGNATURE_HEADER: &str = "X-Nexus-Signature";

/// Header carrying the envelope id subscribers dedupe on.
pub const EVENT_ID_HEADER: &str = "X-Nexus-Event-Id";

/// Orchestrates event fan-out and per-subscription delivery.
#[derive(Clone)]
pub struct DeliveryEngine {
    store: Arc<dyn SubscriptionStore>,
    registry: Arc<EventRegistry>,
    rate_limiter: Arc<RateLimiterRegistry>,
    history: Arc<DeliveryLog>,
    http: Client,
    config: DeliveryConfig,
}

impl DeliveryEngine {
    /// Build an engine around an injected store and registry.
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        registry: Arc<EventRegistry>,
        config: WebhookConfig,
    ) -> Result<Self, WebhookError> {
        let http = Client::builder()
            .timeout(config.delivery.request_timeout())
            .user_agent(config.delivery.user_agent.clone())
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| WebhookError::Internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            store,
            registry,
            rate_limiter: Arc::new(RateLimiterRegistry::new(config.rate_limit)),
            history: Arc::new(DeliveryLog::new(config.history_limit)),
            http,
            config: config.delivery,
        })
    }

    pub fn registry(&self) -> &EventRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn SubscriptionStore> {
        &self.store
    }

    /// Fan an event out to every matching active subscription.
    ///
    /// Invalid event types are a caller error; everything downstream is
    /// best-effort and surfaces only through delivery history.
    pub async fn dispatch(&self, event: Event) -> Result<DispatchReceipt, WebhookError> {
        if !self.registry.is_valid(&event.event_type) {
            return Err(WebhookError::InvalidEventType(event.event_type));
        }

        let subscriptions = self.store.matching(&event.event_type).await?;
        if subscriptions.is_empty() {
            tracing::debug!(
                target: "webhook_delivery",
                event_type = %event.event_type,
                "no active subscriptions match event type"
            );
        }

        let matched = subscriptions.len();
        for subscription in subscriptions {
            let engine = self.clone();
            let event = event.clone();
            tokio::spawn(async move {
                engine
                    .deliver_to(subscription, &event, engine.config.max_retries)
                    .await;
            });
        }

        Ok(DispatchReceipt {
            event_type: event.event_type,
            matched,
        })
    }

    /// Deliver one event to one subscription, awaiting the full retry cycle.
    pub async fn deliver_event(
        &self,
        subscription_id: Uuid,
        event: &Event,
    ) -> Result<DeliveryReport, WebhookError> {
        self.deliver_event_with_retries(subscription_id, event, self.config.max_retries)
            .await
    }

    /// As [`deliver_event`](Self::deliver_event) with an explicit attempt cap.
    pub async fn deliver_event_with_retries(
        &self,
        subscription_id: Uuid,
        event: &Event,
        max_retries: u32,
    ) -> Result<DeliveryReport, WebhookError> {
        let subscription = self
            .store
            .get(subscription_id)
            .await?
            .ok_or(WebhookError::SubscriptionNotFound(subscription_id))?;
        Ok(self.deliver_to(subscription, event, max_retries).await)
    }

    /// Delivery history for a subscription, most recent first.
    pub async fn get_delivery_history(
        &self,
        subscription_id: Uuid,
        limit: usize,
    ) -> Vec<DeliveryAttempt> {
        self.history.recent(subscription_id, limit).await
    }

    /// Health summary derived from recorded history.
    pub async fn get_subscription_health(&self, subscription_id: Uuid) -> SubscriptionHealth {
        self.history.health(subscription_id).await
    }

    /// Aggregate attempt counters for a subscription.
    pub async fn get_delivery_stats(&self, subscription_id: Uuid) -> DeliveryStats {
        self.history.stats(subscription_id).await
    }

    /// Clear rate-limit and history state for a deleted subscription.
    /// Management flows call this after `SubscriptionStore::delete`.
    pub async fn forget_subscription(&self, subscription_id: Uuid) {
        self.rate_limiter.remove(subscription_id).await;
        self.history.remove(subscription_id).await;
    }

    /// The full delivery cycle for one subscription: rate-limit gate, sign,
    /// POST, retry with backoff until success or the attempt cap.
    async fn deliver_to(
        &self,
        subscription: Subscription,
        event: &Event,
        max_retries: u32,
    ) -> DeliveryReport {
        let envelope = Envelope::new(event.event_type.clone(), event.data.clone());

        if !self
            .rate_limiter
            .allow(subscription.id, subscription.rate_limit)
            .await
        {
            tracing::warn!(
                target: "webhook_delivery",
                subscription_id = %subscription.id,
                event_id = %envelope.id,
                event_type = %envelope.event_type,
                "delivery skipped: rate limited"
            );
            self.record_failure(&subscription, &envelope, 1, None, "rate_limited")
                .await;
            return DeliveryReport {
                subscription_id: subscription.id,
                event_id: envelope.id,
                status: DeliveryStatus::Failed,
                attempts: 0,
            };
        }

        // Signed over exactly the bytes that go on the wire.
        let body = match envelope.canonical_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(
                    target: "webhook_delivery",
                    subscription_id = %subscription.id,
                    event_id = %envelope.id,
                    error = %e,
                    "failed to serialize envelope"
                );
                self.record_failure(&subscription, &envelope, 1, None, &e.to_string())
                    .await;
                return DeliveryReport {
                    subscription_id: subscription.id,
                    event_id: envelope.id,
                    status: DeliveryStatus::Failed,
                    attempts: 0,
                };
            }
        };
        let signature = signature::sign(&body, &subscription.secret);

        let max_attempts = max_retries.max(1);
        for attempt in 1..=max_attempts {
            match self
                .post_once(&subscription.endpoint_url, &body, &signature, envelope.id)
                .await
            {
                Ok(status) => {
                    tracing::info!(
                        target: "webhook_delivery",
                        subscription_id = %subscription.id,
                        event_id = %envelope.id,
                        event_type = %envelope.event_type,
                        http_status = status,
                        attempt_number = attempt,
                        "webhook delivered"
                    );
                    self.record_success(&subscription, &envelope, attempt, status)
                        .await;
                    return DeliveryReport {
                        subscription_id: subscription.id,
                        event_id: envelope.id,
                        status: DeliveryStatus::Delivered,
                        attempts: attempt,
                    };
                }
                Err(err) => {
                    let http_status = match err {
                        WebhookError::DeliveryHttp { status } => Some(status),
                        _ => None,
                    };
                    tracing::warn!(
                        target: "webhook_delivery",
                        subscription_id = %subscription.id,
                        event_id = %envelope.id,
                        event_type = %envelope.event_type,
                        error = %err,
                        attempt_number = attempt,
                        will_retry = attempt < max_attempts,
                        "webhook delivery attempt failed"
                    );
                    self.record_failure(
                        &subscription,
                        &envelope,
                        attempt,
                        http_status,
                        &err.to_string(),
                    )
                    .await;
                }
            }

            if attempt == max_attempts {
                break;
            }

            tokio::time::sleep(backoff_delay(attempt, &self.config)).await;

            // Deactivation and deletion are advisory: checked at each retry
            // boundary, never preempting an attempt in flight.
            match self.store.get(subscription.id).await {
                Ok(Some(current)) if current.active => {}
                Ok(Some(_)) => {
                    tracing::info!(
                        target: "webhook_delivery",
                        subscription_id = %subscription.id,
                        event_id = %envelope.id,
                        "stopping retries: subscription deactivated"
                    );
                    return DeliveryReport {
                        subscription_id: subscription.id,
                        event_id: envelope.id,
                        status: DeliveryStatus::Failed,
                        attempts: attempt,
                    };
                }
                Ok(None) => {
                    // Deleted mid-retry: drop pending attempts silently.
                    return DeliveryReport {
                        subscription_id: subscription.id,
                        event_id: envelope.id,
                        status: DeliveryStatus::Failed,
                        attempts: attempt,
                    };
                }
                Err(e) => {
                    tracing::error!(
                        target: "webhook_delivery",
                        subscription_id = %subscription.id,
                        error = %e,
                        "failed to re-check subscription before retry"
                    );
                }
            }
        }

        tracing::warn!(
            target: "webhook_delivery",
            subscription_id = %subscription.id,
            event_id = %envelope.id,
            event_type = %envelope.event_type,
            attempts = max_attempts,
            "webhook delivery permanently failed"
        );
        DeliveryReport {
            subscription_id: subscription.id,
            event_id: envelope.id,
            status: DeliveryStatus::Failed,
            attempts: max_attempts,
        }
    }

    /// One HTTP POST attempt. Any non-2xx status is a retryable failure.
    async fn post_once(
        &self,
        endpoint_url: &str,
        body: &[u8],
        signature: &str,
        envelope_id: Uuid,
    ) -> Result<u16, WebhookError> {
        let response = self
            .http
            .post(endpoint_url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(SIGNATURE_HEADER, signature)
            .header(EVENT_ID_HEADER, envelope_id.to_string())
            .body(body.to_vec())
            .send()
            .await;

        match response {
            Ok(resp) => {
                let status = resp.status().as_u16();
                if resp.status().is_success() {
                    Ok(status)
                } else {
                    Err(WebhookError::DeliveryHttp { status })
                }
            }
            Err(e) if e.is_timeout() => Err(WebhookError::DeliveryTimeout),
            Err(e) => Err(WebhookError::DeliveryConnection(e.to_string())),
        }
    }

    async fn record_success(
        &self,
        subscription: &Subscription,
        envelope: &Envelope,
        attempt_number: u32,
        http_status: u16,
    ) {
        self.history
            .record(DeliveryAttempt {
                subscription_id: subscription.id,
                event_id: envelope.id,
                attempt_number,
                timestamp: Utc::now(),
                outcome: DeliveryOutcome::Success,
                http_status: Some(http_status),
                error: None,
            })
            .await;
    }

    async fn record_failure(
        &self,
        subscription: &Subscription,
        envelope: &Envelope,
        attempt_number: u32,
        http_status: Option<u16>,
        error: &str,
    ) {
        self.history
            .record(DeliveryAttempt {
                subscription_id: subscription.id,
                event_id: envelope.id,
                attempt_number,
                timestamp: Utc::now(),
                outcome: DeliveryOutcome::Failure,
                http_status,
                error: Some(error.to_string()),
            })
            .await;
    }
}

/// Exponential backoff with jitter: `base * 2^(attempt-1)` capped at the
/// configured maximum, plus up to 25% random jitter to avoid retry storms.
fn backoff_delay(attempt: u32, config: &DeliveryConfig) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    let base = config
        .backoff_base_ms
        .saturating_mul(1u64 << exponent)
        .min(config.backoff_max_ms);
    let jitter_cap = base / 4;
    let jitter = if jitter_cap == 0 {
        0
    } else {
        rand::thread_rng().gen_range(0..=jitter_cap)
    };
    Duration::from_millis(base.saturating_add(jitter).min(config.backoff_max_ms))
}
