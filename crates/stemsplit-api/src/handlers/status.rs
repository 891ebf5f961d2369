//! Queue status handler.

use axum::extract::State;
use axum::Json;

use stemsplit_models::QueueStatusResponse;

use crate::error::ApiResult;
use crate::metrics;
use crate::state::AppState;

/// Snapshot of queue depth and worker presence.
pub async fn queue_status(State(state): State<AppState>) -> ApiResult<Json<QueueStatusResponse>> {
    let queue_depth = state.queue.len().await?;
    let active_workers = state.queue.active_workers().await?;
    let completed_jobs = state.queue.completed_count().await?;
    let failed_jobs = state.queue.failed_count().await?;

    metrics::set_queue_depth(queue_depth);

    Ok(Json(QueueStatusResponse {
        queue_depth,
        active_workers,
        completed_jobs,
        failed_jobs,
    }))
}
