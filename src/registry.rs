//! Static catalog of known Nexus event types and their payload schemas.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::WebhookError;

/// Schema descriptor for one event type, used for documentation and for
/// validating producer payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSchema {
    pub event_type: String,
    /// Property name to JSON-schema-style descriptor.
    pub properties: Value,
    pub required: Vec<String>,
}

/// Read-only catalog of event types. The catalog only changes through an
/// explicit [`EventRegistry::reload`].
pub struct EventRegistry {
    schemas: RwLock<HashMap<String, EventSchema>>,
}

impl EventRegistry {
    /// The compiled-in Nexus catalog.
    pub fn builtin() -> Self {
        Self::from_definitions(builtin_catalog())
    }

    pub fn from_definitions(definitions: Vec<EventSchema>) -> Self {
        let schemas = definitions
            .into_iter()
            .map(|s| (s.event_type.clone(), s))
            .collect();
        Self {
            schemas: RwLock::new(schemas),
        }
    }

    /// Replace the catalog wholesale.
    pub fn reload(&self, definitions: Vec<EventSchema>) {
        let mut schemas = self.schemas.write().expect("registry lock poisoned");
        schemas.clear();
        for schema in definitions {
            schemas.insert(schema.event_type.clone(), schema);
        }
    }

    /// All known event type names, sorted.
    pub fn list_all(&self) -> Vec<String> {
        let schemas = self.schemas.read().expect("registry lock poisoned");
        let mut names: Vec<String> = schemas.keys().cloned().collect();
        names.sort();
        names
    }

    /// Exact membership check; wildcards are a subscription concern, not a
    /// registry one.
    pub fn is_valid(&self, event_type: &str) -> bool {
        self.schemas
            .read()
            .expect("registry lock poisoned")
            .contains_key(event_type)
    }

    pub fn get_schema(&self, event_type: &str) -> Result<EventSchema, WebhookError> {
        self.schemas
            .read()
            .expect("registry lock poisoned")
            .get(event_type)
            .cloned()
            .ok_or_else(|| WebhookError::InvalidEventType(event_type.to_string()))
    }
}

impl Default for EventRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

fn schema(event_type: &str, properties: Value, required: &[&str]) -> EventSchema {
    EventSchema {
        event_type: event_type.to_string(),
        properties,
        required: required.iter().map(|s| s.to_string()).collect(),
    }
}

fn builtin_catalog() -> Vec<EventSchema> {
    vec![
        schema(
            "release.created",
            json!({
                "version": {"type": "string"},
                "url": {"type": "string"},
                "notes": {"type": "string"},
            }),
            &["version"],
        ),
        schema(
            "release.deployed",
            json!({
                "version": {"type": "string"},
                "environment": {"type": "string"},
            }),
            &["version", "environment"],
        ),
        schema(
            "build.started",
            json!({
                "job": {"type": "string"},
                "number": {"type": "integer"},
            }),
            &["job", "number"],
        ),
        schema(
            "build.completed",
            json!({
                "job": {"type": "string"},
                "number": {"type": "integer"},
                "duration_secs": {"type": "integer"},
            }),
            &["job", "number"],
        ),
        schema(
            "build.failed",
            json!({
                "job": {"type": "string"},
                "number": {"type": "integer"},
                "reason": {"type": "string"},
            }),
            &["job", "number"],
        ),
        schema(
            "ticket.created",
            json!({
                "key": {"type": "string"},
                "summary": {"type": "string"},
            }),
            &["key"],
        ),
        schema(
            "ticket.updated",
            json!({
                "key": {"type": "string"},
                "fields": {"type": "object"},
            }),
            &["key"],
        ),
        schema(
            "hygiene.violation",
            json!({
                "rule": {"type": "string"},
                "path": {"type": "string"},
                "severity": {"type": "string"},
            }),
            &["rule", "path"],
        ),
        schema(
            "slack.message",
            json!({
                "channel": {"type": "string"},
                "text": {"type": "string"},
            }),
            &["channel", "text"],
        ),
        schema(
            "git.push",
            json!({
                "repository": {"type": "string"},
                "branch": {"type": "string"},
                "commits": {"type": "array"},
            }),
            &["repository", "branch"],
        ),
    ]
}
