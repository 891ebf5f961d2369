//! The job descriptor carried through the queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stemsplit_models::{JobId, ModelVariant};

/// A stem-separation job as enqueued at admission.
///
/// Everything the worker needs is in here; there is no job table to
/// look the rest up from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitJob {
    /// Unique job ID, assigned at admission
    pub job_id: JobId,
    /// Caller-side identifier echoed in the callback
    pub version_id: String,
    /// Where to fetch the source audio from
    pub audio_url: String,
    /// Separation model to run
    pub model: ModelVariant,
    /// Callback URL, already allowlist-checked at admission
    pub webhook_url: String,
    /// Opaque tracing id
    pub correlation_id: Option<String>,
    /// When admission accepted the job
    pub enqueued_at: DateTime<Utc>,
}

impl SplitJob {
    /// Create a new job with a fresh id.
    pub fn new(
        version_id: impl Into<String>,
        audio_url: impl Into<String>,
        model: ModelVariant,
        webhook_url: impl Into<String>,
    ) -> Self {
        Self {
            job_id: JobId::new(),
            version_id: version_id.into(),
            audio_url: audio_url.into(),
            model,
            webhook_url: webhook_url.into(),
            correlation_id: None,
            enqueued_at: Utc::now(),
        }
    }

    /// Attach a correlation id.
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Key for the admission idempotency ledger. Two submissions of the
    /// same version with the same model are the same logical request.
    pub fn admission_key(&self) -> String {
        format!("{}:{}", self.version_id, self.model)
    }
}
