//! The canonical envelope delivered to subscribers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::WebhookError;

/// Wire envelope: `{id, type, timestamp, data}`.
///
/// The `id` is fresh per delivery and is what subscribers dedupe on; delivery
/// is at-least-once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub data: Value,
}

impl Envelope {
    pub fn new(event_type: impl Into<String>, data: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type: event_type.into(),
            timestamp: Utc::now(),
            data,
        }
    }

    /// Serialize to the exact bytes that are signed and transmitted.
    ///
    /// The signature must be computed over these bytes and the same buffer
    /// sent as the request body; re-serializing risks signature drift.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, WebhookError> {
        Ok(serde_json::to_vec(self)?)
    }
}
