//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Job failed: {0}")]
    JobFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Resource limit exceeded: {0}")]
    ResourceLimit(String),

    #[error("Webhook delivery failed after {attempts} attempts: {last_error}")]
    DeliveryFailed { attempts: u32, last_error: String },

    #[error("Webhook rejected with status {0}")]
    DeliveryRejected(u16),

    #[error("Storage error: {0}")]
    Storage(#[from] stemsplit_storage::StorageError),

    #[error("Media error: {0}")]
    Media(#[from] stemsplit_media::MediaError),

    #[error("Queue error: {0}")]
    Queue(#[from] stemsplit_queue::QueueError),

    #[error("Webhook error: {0}")]
    Webhook(#[from] stemsplit_webhook::WebhookError),

    #[error("Record error: {0}")]
    Record(#[from] stemsplit_models::RecordError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn job_failed(msg: impl Into<String>) -> Self {
        Self::JobFailed(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn resource_limit(msg: impl Into<String>) -> Self {
        Self::ResourceLimit(msg.into())
    }

    /// Coarse failure classification reported in callbacks and metrics.
    ///
    /// `TransientInfraError` covers failures where a retry on another
    /// attempt may succeed. `ResourceLimitExceeded` covers input or
    /// wall-clock caps. Everything else is a `ProcessingError`.
    pub fn kind(&self) -> &'static str {
        use stemsplit_media::MediaError;

        match self {
            WorkerError::ResourceLimit(_) => "ResourceLimitExceeded",
            WorkerError::Media(MediaError::ResourceLimit(_)) => "ResourceLimitExceeded",
            WorkerError::Media(MediaError::Fetch { .. }) => "TransientInfraError",
            WorkerError::Storage(_)
            | WorkerError::Queue(_)
            | WorkerError::Io(_)
            | WorkerError::DeliveryFailed { .. } => "TransientInfraError",
            _ => "ProcessingError",
        }
    }

    /// Check if the job should be requeued for another attempt.
    pub fn is_retryable(&self) -> bool {
        self.kind() == "TransientInfraError"
    }
}
