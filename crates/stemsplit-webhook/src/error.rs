//! Webhook error type.

use thiserror::Error;

pub type WebhookResult<T> = Result<T, WebhookError>;

/// Failure building or executing a delivery.
///
/// An endpoint that answered and said no is not an error; that comes
/// back as a `DeliveryOutcome`.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("dispatcher configuration: {0}")]
    Config(String),

    #[error("http client: {0}")]
    Http(#[from] reqwest::Error),

    #[error("payload serialization: {0}")]
    Json(#[from] serde_json::Error),
}

impl WebhookError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
