use std::future::ready;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::Method;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::classifier::Classify;
use crate::event_log::EventLog;
use crate::storage::HybridStore;
use crate::time::Clock;
use crate::{messages_endpoint, receive_endpoint};

use crate::prometheus::{setup_metrics_recorder, track_metrics};

#[derive(Clone)]
pub struct State {
    pub store: HybridStore,
    pub classifier: Arc<dyn Classify + Send + Sync>,
    pub clock: Arc<dyn Clock + Send + Sync>,
    pub events: EventLog,
}

async fn index() -> &'static str {
    "inbox"
}

pub fn router<
    C: Clock + Send + Sync + 'static,
    K: Classify + Send + Sync + 'static,
>(
    clock: C,
    classifier: K,
    store: HybridStore,
    events: EventLog,
    max_body_size: usize,
    metrics: bool,
) -> Router {
    let state = State {
        store,
        classifier: Arc::new(classifier),
        clock: Arc::new(clock),
        events,
    };

    // Webhook providers and the browser UI both call in; accept any origin.
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
        .allow_origin(AllowOrigin::mirror_request());

    let router = Router::new()
        .route("/", get(index))
        .route("/_readiness", get(index))
        .route("/_liveness", get(|| ready("ok")))
        .route(
            "/api/receive",
            post(receive_endpoint::receive).get(receive_endpoint::status),
        )
        .route(
            "/api/webhooks/:channel",
            post(receive_endpoint::webhook).get(receive_endpoint::webhook_status),
        )
        .route("/api/messages", get(messages_endpoint::list))
        .route("/api/messages/export", get(messages_endpoint::export))
        .route(
            "/api/messages/:id",
            get(messages_endpoint::get_message)
                .patch(messages_endpoint::update_message)
                .delete(messages_endpoint::delete_message),
        )
        .route("/api/sync", post(messages_endpoint::sync))
        .layer(DefaultBodyLimit::max(max_body_size))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(axum::middleware::from_fn(track_metrics))
        .with_state(state);

    // Don't install metrics unless asked to
    // Installing a global recorder when the router is built more than once
    // (during tests etc) does not work well.
    if metrics {
        match setup_metrics_recorder() {
            Ok(recorder_handle) => {
                router.route("/metrics", get(move || ready(recorder_handle.render())))
            }
            Err(e) => {
                error!("failed to install prometheus recorder: {}", e);
                router
            }
        }
    } else {
        router
    }
}
