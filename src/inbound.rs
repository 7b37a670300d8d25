//! Inbound webhook receiver for third-party systems (CI, trackers).
//!
//! Each configured source carries a pre-shared secret. Incoming payloads must
//! present a valid `X-Nexus-Signature` over the raw body before they are
//! trusted and turned into events for dispatch.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::post,
    Router,
};
use serde::Deserialize;
use serde_json::Value;
use tokio::net::TcpListener;

use crate::delivery::{DeliveryEngine, SIGNATURE_HEADER};
use crate::error::WebhookError;
use crate::signature;

/// A third-party sender allowed to push events into the engine.
#[derive(Debug, Clone)]
pub struct InboundSource {
    pub secret: String,
}

#[derive(Clone)]
struct InboundState {
    engine: DeliveryEngine,
    sources: Arc<HashMap<String, InboundSource>>,
}

/// Body shape accepted from third parties.
#[derive(Deserialize)]
struct InboundBody {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    data: Value,
}

/// Build the inbound router. `POST /inbound/{source}`.
pub fn router(engine: DeliveryEngine, sources: HashMap<String, InboundSource>) -> Router {
    let state = InboundState {
        engine,
        sources: Arc::new(sources),
    };
    Router::new()
        .route("/inbound/{source}", post(handle_inbound))
        .with_state(state)
}

/// Bind on an ephemeral local port, serve in a background task, and return
/// the bound port.
pub async fn start(
    engine: DeliveryEngine,
    sources: HashMap<String, InboundSource>,
) -> Result<u16, WebhookError> {
    let app = router(engine, sources);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .map_err(|e| WebhookError::Internal(format!("failed to bind inbound server: {e}")))?;
    let port = listener
        .local_addr()
        .map_err(|e| WebhookError::Internal(format!("failed to read bound address: {e}")))?
        .port();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(target: "webhook_inbound", error = %e, "inbound server error");
        }
    });

    Ok(port)
}

async fn handle_inbound(
    Path(source): Path<String>,
    State(state): State<InboundState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let Some(inbound) = state.sources.get(&source) else {
        return StatusCode::NOT_FOUND;
    };

    let provided = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if !signature::verify(&body, provided, &inbound.secret) {
        tracing::warn!(
            target: "webhook_inbound",
            source = %source,
            "rejected inbound webhook: signature mismatch"
        );
        return StatusCode::UNAUTHORIZED;
    }

    let parsed: InboundBody = match serde_json::from_slice(&body) {
        Ok(b) => b,
        Err(_) => return StatusCode::UNPROCESSABLE_ENTITY,
    };

    let event = crate::types::Event::new(parsed.event_type, parsed.data);
    match state.engine.dispatch(event).await {
        Ok(receipt) => {
            tracing::info!(
                target: "webhook_inbound",
                source = %source,
                event_type = %receipt.event_type,
                matched = receipt.matched,
                "accepted inbound webhook"
            );
            StatusCode::ACCEPTED
        }
        Err(WebhookError::InvalidEventType(_)) => StatusCode::UNPROCESSABLE_ENTITY,
        Err(e) => {
            tracing::error!(
                target: "webhook_inbound",
                source = %source,
                error = %e,
                "failed to dispatch inbound event"
            );
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
