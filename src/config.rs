//! Engine configuration with serde-friendly defaults.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::RateLimit;

/// Top-level configuration for the webhook engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    pub delivery: DeliveryConfig,
    /// Default rate limit applied when a subscription carries no override.
    pub rate_limit: RateLimit,
    /// Maximum delivery attempts retained per subscription (oldest evicted).
    pub history_limit: usize,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            delivery: DeliveryConfig::default(),
            rate_limit: RateLimit {
                max_requests: 60,
                window_secs: 60,
            },
            history_limit: 50,
        }
    }
}

/// Outbound delivery tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Total attempts per delivery, including the first.
    pub max_retries: u32,
    /// Base backoff delay in milliseconds; doubles per attempt.
    pub backoff_base_ms: u64,
    /// Upper bound on a single backoff delay.
    pub backoff_max_ms: u64,
    /// Per-attempt HTTP timeout in seconds.
    pub request_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base_ms: 500,
            backoff_max_ms: 30_000,
            request_timeout_secs: 10,
            user_agent: "nexus-webhooks/0.1".to_string(),
        }
    }
}

impl DeliveryConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
