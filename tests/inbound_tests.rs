//! Inbound receiver: signature gate, source lookup, and dispatch wiring.

mod common;

use std::collections::HashMap;
use std::time::Duration;

use serde_json::json;

use common::{
    build_engine, create_subscription, fast_config, mount, wait_until, CountingResponder, SECRET_1,
};
use nexus_webhooks::inbound::{self, InboundSource};
use nexus_webhooks::{signature, SIGNATURE_HEADER};

const INBOUND_SECRET: &str = "ci-preshared-secret";

fn sources() -> HashMap<String, InboundSource> {
    HashMap::from([(
        "ci".to_string(),
        InboundSource {
            secret: INBOUND_SECRET.to_string(),
        },
    )])
}

#[tokio::test]
async fn verified_inbound_webhook_is_dispatched() {
    let responder = CountingResponder::new();
    let (_server, url) = mount(responder.clone()).await;
    let (engine, store) = build_engine(fast_config());
    create_subscription(&store, &url, &["build.completed"], SECRET_1).await;

    let port = inbound::start(engine, sources()).await.unwrap();

    let body = serde_json::to_vec(&json!({
        "type": "build.completed",
        "data": {"job": "x", "number": 1}
    }))
    .unwrap();
    let sig = signature::sign(&body, INBOUND_SECRET);

    let resp = reqwest::Client::new()
        .post(format!("http://127.0.0.1:{port}/inbound/ci"))
        .header(SIGNATURE_HEADER, sig)
        .header("Content-Type", "application/json")
        .body(body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 202);

    // The accepted event fans out to the matching subscriber
    let r = responder.clone();
    assert!(wait_until(move || r.count() == 1, Duration::from_secs(2)).await);
}

#[tokio::test]
async fn invalid_signature_is_rejected() {
    let responder = CountingResponder::new();
    let (_server, url) = mount(responder.clone()).await;
    let (engine, store) = build_engine(fast_config());
    create_subscription(&store, &url, &["*"], SECRET_1).await;

    let port = inbound::start(engine, sources()).await.unwrap();

    let body = serde_json::to_vec(&json!({"type": "build.completed", "data": {}})).unwrap();
    let sig = signature::sign(&body, "wrong-secret");

    let resp = reqwest::Client::new()
        .post(format!("http://127.0.0.1:{port}/inbound/ci"))
        .header(SIGNATURE_HEADER, sig)
        .body(body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 401);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(responder.count(), 0);
}

#[tokio::test]
async fn missing_signature_is_rejected() {
    let (engine, _store) = build_engine(fast_config());
    let port = inbound::start(engine, sources()).await.unwrap();

    let body = serde_json::to_vec(&json!({"type": "build.completed", "data": {}})).unwrap();
    let resp = reqwest::Client::new()
        .post(format!("http://127.0.0.1:{port}/inbound/ci"))
        .body(body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 401);
}

#[tokio::test]
async fn unknown_source_is_not_found() {
    let (engine, _store) = build_engine(fast_config());
    let port = inbound::start(engine, sources()).await.unwrap();

    let body = serde_json::to_vec(&json!({"type": "build.completed", "data": {}})).unwrap();
    let sig = signature::sign(&body, INBOUND_SECRET);

    let resp = reqwest::Client::new()
        .post(format!("http://127.0.0.1:{port}/inbound/jira"))
        .header(SIGNATURE_HEADER, sig)
        .body(body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 404);
}

#[tokio::test]
async fn unknown_event_type_is_unprocessable() {
    let (engine, _store) = build_engine(fast_config());
    let port = inbound::start(engine, sources()).await.unwrap();

    let body = serde_json::to_vec(&json!({"type": "not.a.thing", "data": {}})).unwrap();
    let sig = signature::sign(&body, INBOUND_SECRET);

    let resp = reqwest::Client::new()
        .post(format!("http://127.0.0.1:{port}/inbound/ci"))
        .header(SIGNATURE_HEADER, sig)
        .body(body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 422);
}

#[tokio::test]
async fn malformed_body_is_unprocessable() {
    let (engine, _store) = build_engine(fast_config());
    let port = inbound::start(engine, sources()).await.unwrap();

    let body = b"not json at all".to_vec();
    let sig = signature::sign(&body, INBOUND_SECRET);

    let resp = reqwest::Client::new()
        .post(format!("http://127.0.0.1:{port}/inbound/ci"))
        .header(SIGNATURE_HEADER, sig)
        .body(body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 422);
}
