#![allow(dead_code)]

use std::sync::{Arc, Once};

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use chrono::{DateTime, TimeZone, Utc};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use inbox::classifier::HeuristicClassifier;
use inbox::event_log::EventLog;
use inbox::router::router;
use inbox::storage::memory::MemoryBackend;
use inbox::storage::{FallbackPolicy, HybridStore};
use inbox::time::Clock;

pub const MAX_BODY_SIZE: usize = 64 * 1024;

static TRACING_INIT: Once = Once::new();
pub fn setup_tracing() {
    TRACING_INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_writer(tracing_subscriber::fmt::TestWriter::new())
            .init()
    });
}

#[derive(Clone)]
pub struct FixedClock {
    pub time: DateTime<Utc>,
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.time
    }
}

pub fn received_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap()
}

/// A router wired to in-memory tiers, with handles on each tier so tests can
/// take them offline or look inside.
pub struct TestApp {
    pub router: Router,
    pub remote: Arc<MemoryBackend>,
    pub local: Arc<MemoryBackend>,
    pub events: EventLog,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_clock(FixedClock {
            time: received_at(),
        })
    }

    pub fn with_clock<C: Clock + Send + Sync + 'static>(clock: C) -> Self {
        setup_tracing();
        let remote = Arc::new(MemoryBackend::new());
        let local = Arc::new(MemoryBackend::provisional());
        let events = EventLog::default();
        let store = HybridStore::new(
            remote.clone(),
            Some(local.clone()),
            FallbackPolicy::default(),
        );
        let router = router(
            clock,
            HeuristicClassifier {},
            store,
            events.clone(),
            MAX_BODY_SIZE,
            false,
        );
        Self {
            router,
            remote,
            local,
            events,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, body.to_vec())
    }

    pub async fn send_json(&self, request: Request<Body>) -> (StatusCode, Value) {
        let (status, body) = self.send(request).await;
        let json = serde_json::from_slice(&body)
            .unwrap_or_else(|e| panic!("non-JSON body ({e}): {}", String::from_utf8_lossy(&body)));
        (status, json)
    }

    pub async fn post_json(&self, uri: &str, body: &Value) -> (StatusCode, Value) {
        self.send_json(post(uri, "application/json", body.to_string()))
            .await
    }

    pub async fn post_form(&self, uri: &str, body: &str) -> (StatusCode, Value) {
        self.send_json(post(
            uri,
            "application/x-www-form-urlencoded",
            body.to_string(),
        ))
        .await
    }

    pub async fn get_json(&self, uri: &str) -> (StatusCode, Value) {
        self.send_json(get(uri)).await
    }
}

pub fn post(uri: &str, content_type: &str, body: String) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(body))
        .unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}
