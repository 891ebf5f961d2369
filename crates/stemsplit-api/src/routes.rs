//! Route table and layer stack.

use axum::middleware::from_fn;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;

use crate::handlers::{health, queue_status, submit_split};
use crate::metrics::metrics_middleware;
use crate::middleware::{request_id, request_logging};
use crate::state::AppState;

/// Assemble the router: the three public endpoints plus the optional scrape
/// surface, wrapped in body-limit, metrics, correlation and access-log layers.
pub fn build_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let mut router = Router::new()
        .route("/split", post(submit_split))
        .route("/queue/status", get(queue_status))
        .route("/healthz", get(health));

    if let Some(handle) = metrics_handle {
        router = router.route("/metrics", get(move || async move { handle.render() }));
    }

    router
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(from_fn(metrics_middleware))
        .layer(from_fn(request_id))
        .layer(from_fn(request_logging))
        .with_state(state)
}
