//! Job submission handler.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use tracing::info;
use url::Url;

use stemsplit_models::{SplitRequest, SplitResponse};
use stemsplit_queue::SplitJob;
use stemsplit_webhook::{SIGNATURE_HEADER, TIMESTAMP_HEADER};

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

/// Accept a signed split request and enqueue it.
///
/// The signature covers the raw body bytes, so verification happens before
/// any parsing. An unauthenticated caller learns nothing about how the body
/// would have been interpreted.
pub async fn submit_split(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<SplitResponse>)> {
    let signature = header_str(&headers, SIGNATURE_HEADER)
        .ok_or_else(|| ApiError::unauthorized("Missing X-Signature header"))?;
    let timestamp = header_str(&headers, TIMESTAMP_HEADER)
        .ok_or_else(|| ApiError::unauthorized("Missing X-Timestamp header"))?;

    if !state
        .codec
        .verify(&body, timestamp, signature, state.config.signature_max_skew)
    {
        return Err(ApiError::unauthorized("Invalid request signature"));
    }

    let request: SplitRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request(format!("Invalid request body: {}", e)))?;

    if request.version_id.trim().is_empty() {
        return Err(ApiError::bad_request("versionId must not be empty"));
    }
    let audio_url = Url::parse(&request.audio_url)
        .map_err(|_| ApiError::bad_request("audioUrl is not a valid URL"))?;
    if !matches!(audio_url.scheme(), "http" | "https") {
        return Err(ApiError::bad_request("audioUrl must use http or https"));
    }

    if !state.allowlist.is_allowed(&request.webhook) {
        return Err(ApiError::forbidden("Webhook URL is not allowlisted"));
    }

    let mut job = SplitJob::new(
        &request.version_id,
        &request.audio_url,
        request.ai_model,
        &request.webhook,
    );
    if let Some(correlation_id) = &request.correlation_id {
        job = job.with_correlation_id(correlation_id);
    }

    // Idempotent replay: an earlier submission of the same version+model
    // already owns this request, so answer with its id and enqueue nothing.
    if let Some(existing) = state.queue.claim_admission(&job).await? {
        info!(
            "Replayed submission for version {} answered with existing job {}",
            request.version_id, existing
        );
        return Ok((
            StatusCode::ACCEPTED,
            Json(SplitResponse {
                job_id: existing.into(),
            }),
        ));
    }

    state.queue.enqueue(&job).await?;
    metrics::record_job_enqueued(request.ai_model.as_str());

    info!(
        "Accepted split job {} for version {} (model {})",
        job.job_id, request.version_id, request.ai_model
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(SplitResponse { job_id: job.job_id }),
    ))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
