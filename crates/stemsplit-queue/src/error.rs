//! Queue error type.

use thiserror::Error;

pub type QueueResult<T> = Result<T, QueueError>;

/// Broker-side failure.
///
/// Both variants convert with `?`; the worker treats every queue error
/// as transient infrastructure trouble.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The Redis conversation itself went wrong.
    #[error("broker: {0}")]
    Broker(#[from] redis::RedisError),

    /// A stream entry carried a body that does not decode as a job.
    #[error("job payload: {0}")]
    Payload(#[from] serde_json::Error),
}
