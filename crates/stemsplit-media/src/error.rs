//! Error type shared by the fetch, probe and separation stages.

use std::path::PathBuf;

use thiserror::Error;

/// Failure in one of the media stages.
///
/// The worker maps these onto its failure kinds: `Fetch` counts as
/// transient infrastructure, `ResourceLimit` is terminal without retry, and
/// everything else is a terminal processing fault.
#[derive(Error, Debug)]
pub enum MediaError {
    /// The configured separator binary is not on `PATH`.
    #[error("demucs binary not found: {0}")]
    DemucsNotFound(String),

    #[error("ffprobe not found in PATH")]
    FfprobeNotFound,

    /// Source audio could not be fetched from the caller's URL.
    #[error("fetch failed: {message}")]
    Fetch { message: String },

    /// The separator ran and came back unhappy. Stderr and exit code are
    /// kept for the failure callback.
    #[error("separation failed: {message}")]
    SeparationFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("probe failed: {message}")]
    ProbeFailed {
        message: String,
        stderr: Option<String>,
    },

    /// The source audio blew through the configured input cap.
    #[error("resource limit exceeded: {0}")]
    ResourceLimit(String),

    #[error("file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

impl MediaError {
    pub fn fetch_failed(message: impl Into<String>) -> Self {
        Self::Fetch {
            message: message.into(),
        }
    }
}

pub type MediaResult<T> = Result<T, MediaError>;
