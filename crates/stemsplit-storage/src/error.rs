//! Storage error type.

use thiserror::Error;

pub type StorageResult<T> = Result<T, StorageError>;

/// Failure talking to the object store.
///
/// The worker classifies all of these as transient; uploads get a few
/// quick retries before the job goes back to the queue.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Missing or unusable credential/bucket settings.
    #[error("storage configuration: {0}")]
    Config(String),

    #[error("upload failed: {0}")]
    Upload(String),

    #[error("presign failed: {0}")]
    Presign(String),

    /// Any other SDK-reported failure (head, connectivity).
    #[error("s3: {0}")]
    Sdk(String),
}

impl StorageError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn upload(msg: impl Into<String>) -> Self {
        Self::Upload(msg.into())
    }
}
