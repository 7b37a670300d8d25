//! Core data model: subscriptions, events, delivery attempts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A subscriber registration: where to deliver, which events, how to sign.
#[derive(Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: Uuid,
    pub endpoint_url: String,
    /// Concrete types or patterns (`build.*`, `*`). Never empty.
    pub event_types: Vec<String>,
    pub secret: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    /// Per-subscription override of the global rate limit.
    pub rate_limit: Option<RateLimit>,
}

// The secret must never appear in full in logs or debug output.
impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("endpoint_url", &self.endpoint_url)
            .field("event_types", &self.event_types)
            .field("secret", &redact(&self.secret))
            .field("active", &self.active)
            .field("created_at", &self.created_at)
            .field("rate_limit", &self.rate_limit)
            .finish()
    }
}

fn redact(secret: &str) -> String {
    if secret.chars().count() <= 4 {
        "****".to_string()
    } else {
        let prefix: String = secret.chars().take(4).collect();
        format!("{prefix}****")
    }
}

impl Subscription {
    /// Whether an event of the given type should be delivered here.
    /// Inactive subscriptions never match.
    pub fn matches(&self, event_type: &str) -> bool {
        self.active
            && self
                .event_types
                .iter()
                .any(|p| event_type_matches(p, event_type))
    }
}

/// Sliding-window rate limit: at most `max_requests` admissions within any
/// trailing `window_secs` interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    pub max_requests: u32,
    pub window_secs: u64,
}

/// Input for creating a subscription.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateSubscription {
    pub endpoint_url: String,
    pub event_types: Vec<String>,
    pub secret: String,
    #[serde(default)]
    pub rate_limit: Option<RateLimit>,
}

/// Partial update; `None` fields are left unchanged. The id is immutable.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateSubscription {
    pub endpoint_url: Option<String>,
    pub event_types: Option<Vec<String>>,
    pub secret: Option<String>,
    pub active: Option<bool>,
    pub rate_limit: Option<RateLimit>,
}

/// Listing filter for management surfaces.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct SubscriptionFilter {
    pub active: Option<bool>,
}

/// A transient domain event handed to `dispatch`. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(event_type: impl Into<String>, data: Value) -> Self {
        Self {
            event_type: event_type.into(),
            data,
            timestamp: Utc::now(),
        }
    }
}

/// Outcome of a single delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryOutcome {
    Success,
    Failure,
}

/// One recorded delivery attempt. Append-only; never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryAttempt {
    pub subscription_id: Uuid,
    pub event_id: Uuid,
    pub attempt_number: u32,
    pub timestamp: DateTime<Utc>,
    pub outcome: DeliveryOutcome,
    pub http_status: Option<u16>,
    pub error: Option<String>,
}

/// Terminal status of a delivery to one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Delivered,
    Failed,
}

/// Result of a `deliver_event` call.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryReport {
    pub subscription_id: Uuid,
    pub event_id: Uuid,
    pub status: DeliveryStatus,
    pub attempts: u32,
}

/// Result of a `dispatch` call: delivery itself is fire-and-forget.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchReceipt {
    pub event_type: String,
    /// Number of subscriptions the event fanned out to.
    pub matched: usize,
}

/// Coarse health classification derived from recent delivery history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Failing,
    /// No attempts recorded yet.
    Unknown,
}

/// Per-subscription health summary, derived purely from recorded history.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionHealth {
    pub status: HealthStatus,
    pub last_delivery: Option<DateTime<Utc>>,
    pub success_rate: f64,
}

/// Aggregate per-subscription delivery counters.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct DeliveryStats {
    pub total_attempts: u64,
    pub successes: u64,
    pub failures: u64,
}

/// Match an event type against a subscription pattern.
///
/// Three forms: an exact type name, a trailing wildcard (`build.*` matches
/// `build.completed` but not `release.created`), and the universal `*`.
/// Matching is case-sensitive.
pub fn event_type_matches(pattern: &str, event_type: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if let Some(prefix) = pattern.strip_suffix(".*") {
        return event_type
            .rsplit_once('.')
            .is_some_and(|(head, _)| head == prefix);
    }
    pattern == event_type
}
