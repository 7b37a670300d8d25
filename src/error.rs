//! Error types for the webhook system.

use uuid::Uuid;

/// Webhook system error variants.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("unknown event type: {0}")]
    InvalidEventType(String),

    #[error("subscription not found: {0}")]
    SubscriptionNotFound(Uuid),

    #[error("rate limit exceeded for subscription {0}")]
    RateLimited(Uuid),

    #[error("invalid subscription: {0}")]
    Validation(String),

    #[error("signature mismatch")]
    SignatureMismatch,

    #[error("delivery timed out")]
    DeliveryTimeout,

    #[error("connection failed: {0}")]
    DeliveryConnection(String),

    #[error("endpoint returned HTTP {status}")]
    DeliveryHttp { status: u16 },

    #[error("payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl WebhookError {
    /// Whether a delivery failure with this error may be retried.
    ///
    /// Rate-limit denials are a hard skip; all transport-level failures and
    /// every non-2xx response retry identically.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WebhookError::DeliveryTimeout
                | WebhookError::DeliveryConnection(_)
                | WebhookError::DeliveryHttp { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, WebhookError>;
