//! Admission API request/response schemas.

use serde::{Deserialize, Serialize};

use crate::job::JobId;
use crate::model::ModelVariant;

/// Body of `POST /split`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitRequest {
    /// Caller-side identifier the callback echoes back
    pub version_id: String,
    /// Where to fetch the source audio from
    pub audio_url: String,
    /// Which separation model to run
    #[serde(default)]
    pub ai_model: ModelVariant,
    /// Callback URL; must match the configured allowlist
    pub webhook: String,
    /// Opaque tracing id, logged but never interpreted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

/// Body of the `202 Accepted` admission response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitResponse {
    pub job_id: JobId,
}

/// Body of `GET /queue/status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatusResponse {
    /// Messages waiting in the job stream
    pub queue_depth: u64,
    /// Workers with a live heartbeat
    pub active_workers: u64,
    /// Jobs completed since the counters were created
    pub completed_jobs: u64,
    /// Jobs finally failed since the counters were created
    pub failed_jobs: u64,
}
