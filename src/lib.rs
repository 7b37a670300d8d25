//! Webhook subscription and delivery engine for Nexus domain events.
//!
//! Producers call [`DeliveryEngine::dispatch`] with a domain event; the engine
//! matches it against active subscriptions (exact types, `prefix.*` patterns,
//! or `*`), rate-limits per subscriber, signs the canonical payload bytes with
//! HMAC-SHA256, delivers over HTTP with exponential-backoff retries, and keeps
//! a bounded, append-only delivery history per subscription.
//!
//! Delivery is at-least-once; subscribers dedupe on the envelope id.

pub mod config;
pub mod delivery;
pub mod error;
pub mod history;
pub mod inbound;
pub mod payload;
pub mod rate_limit;
pub mod registry;
pub mod signature;
pub mod store;
pub mod types;

pub use config::{DeliveryConfig, WebhookConfig};
pub use delivery::{DeliveryEngine, EVENT_ID_HEADER, SIGNATURE_HEADER};
pub use error::WebhookError;
pub use payload::Envelope;
pub use rate_limit::RateLimiterRegistry;
pub use registry::{EventRegistry, EventSchema};
pub use store::{InMemorySubscriptionStore, SubscriptionStore};
pub use types::{
    CreateSubscription, DeliveryAttempt, DeliveryOutcome, DeliveryReport, DeliveryStats,
    DeliveryStatus, DispatchReceipt, Event, HealthStatus, RateLimit, Subscription,
    SubscriptionFilter, SubscriptionHealth, UpdateSubscription,
};
