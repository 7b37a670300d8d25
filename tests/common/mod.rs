//! Shared fixtures for integration tests: mock subscriber endpoints and
//! engine construction with fast retry timing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use nexus_webhooks::{
    CreateSubscription, DeliveryEngine, EventRegistry, InMemorySubscriptionStore, RateLimit,
    Subscription, SubscriptionStore, WebhookConfig,
};

pub const SECRET_1: &str = "whsec_test_secret_12345";
pub const SECRET_2: &str = "whsec_other_secret_67890";

/// Engine config with millisecond-scale backoff so retry tests run fast.
pub fn fast_config() -> WebhookConfig {
    let mut config = WebhookConfig::default();
    config.delivery.max_retries = 3;
    config.delivery.backoff_base_ms = 40;
    config.delivery.backoff_max_ms = 200;
    config.delivery.request_timeout_secs = 2;
    config.rate_limit = RateLimit {
        max_requests: 1000,
        window_secs: 60,
    };
    config
}

pub fn build_engine(config: WebhookConfig) -> (DeliveryEngine, Arc<InMemorySubscriptionStore>) {
    let store = Arc::new(InMemorySubscriptionStore::new());
    let registry = Arc::new(EventRegistry::builtin());
    let engine = DeliveryEngine::new(store.clone(), registry, config).expect("engine builds");
    (engine, store)
}

pub async fn create_subscription(
    store: &InMemorySubscriptionStore,
    endpoint_url: &str,
    event_types: &[&str],
    secret: &str,
) -> Subscription {
    store
        .create(CreateSubscription {
            endpoint_url: endpoint_url.to_string(),
            event_types: event_types.iter().map(|s| s.to_string()).collect(),
            secret: secret.to_string(),
            rate_limit: None,
        })
        .await
        .expect("subscription created")
}

/// Mount a responder on a fresh mock server and return the webhook URL.
pub async fn mount(responder: impl Respond + 'static) -> (MockServer, String) {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/webhook"))
        .respond_with(responder)
        .mount(&server)
        .await;
    let url = format!("{}/webhook", server.uri());
    (server, url)
}

/// Poll a condition until it holds or the timeout elapses.
pub async fn wait_until(mut condition: impl FnMut() -> bool, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}

// ---------------------------------------------------------------------------
// Responders
// ---------------------------------------------------------------------------

/// A captured HTTP request with body and headers.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub body: Vec<u8>,
    pub headers: HashMap<String, String>,
}

impl CapturedRequest {
    pub fn body_json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("body is JSON")
    }

    /// Header value by name, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        let wanted = name.to_lowercase();
        self.headers
            .iter()
            .find(|(k, _)| k.to_lowercase() == wanted)
            .map(|(_, v)| v.as_str())
    }
}

/// Captures every incoming request and responds with a fixed status.
#[derive(Clone)]
pub struct CaptureResponder {
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
    response_code: u16,
}

impl CaptureResponder {
    pub fn new() -> Self {
        Self::with_status(200)
    }

    pub fn with_status(status: u16) -> Self {
        Self {
            requests: Arc::new(Mutex::new(Vec::new())),
            response_code: status,
        }
    }

    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl Default for CaptureResponder {
    fn default() -> Self {
        Self::new()
    }
}

impl Respond for CaptureResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let captured = CapturedRequest {
            body: request.body.clone(),
            headers: request
                .headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
                .collect(),
        };
        self.requests.lock().unwrap().push(captured);
        ResponseTemplate::new(self.response_code)
    }
}

/// Counts requests and responds with a fixed status.
#[derive(Clone)]
pub struct CountingResponder {
    count: Arc<AtomicU32>,
    response_code: u16,
}

impl CountingResponder {
    pub fn new() -> Self {
        Self::with_status(200)
    }

    pub fn with_status(status: u16) -> Self {
        Self {
            count: Arc::new(AtomicU32::new(0)),
            response_code: status,
        }
    }

    pub fn count(&self) -> u32 {
        self.count.load(Ordering::SeqCst)
    }
}

impl Default for CountingResponder {
    fn default() -> Self {
        Self::new()
    }
}

impl Respond for CountingResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        self.count.fetch_add(1, Ordering::SeqCst);
        ResponseTemplate::new(self.response_code)
    }
}

/// Fails a fixed number of times before succeeding.
#[derive(Clone)]
pub struct FailingResponder {
    attempts: Arc<AtomicU32>,
    failures_before_success: u32,
    failure_code: u16,
}

impl FailingResponder {
    pub fn fail_times(n: u32) -> Self {
        Self::fail_with_status(n, 500)
    }

    pub fn fail_with_status(n: u32, failure_code: u16) -> Self {
        Self {
            attempts: Arc::new(AtomicU32::new(0)),
            failures_before_success: n,
            failure_code,
        }
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Respond for FailingResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let n = self.attempts.fetch_add(1, Ordering::SeqCst);
        if n < self.failures_before_success {
            ResponseTemplate::new(self.failure_code)
        } else {
            ResponseTemplate::new(200)
        }
    }
}

/// Responds 200 after a fixed delay.
#[derive(Clone)]
pub struct DelayedResponder {
    delay_ms: u64,
    count: Arc<AtomicU32>,
}

impl DelayedResponder {
    pub fn new(delay_ms: u64) -> Self {
        Self {
            delay_ms,
            count: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn count(&self) -> u32 {
        self.count.load(Ordering::SeqCst)
    }
}

impl Respond for DelayedResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        self.count.fetch_add(1, Ordering::SeqCst);
        ResponseTemplate::new(200).set_delay(Duration::from_millis(self.delay_ms))
    }
}
