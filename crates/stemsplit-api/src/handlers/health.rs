//! Liveness probe.

use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

/// Flat 200 so orchestrators can tell the process is up. Readiness against
/// Redis is the queue-status endpoint's job.
pub async fn health() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}
