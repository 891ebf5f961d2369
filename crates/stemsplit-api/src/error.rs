//! Error responses.
//!
//! Handler failures map onto the admission contract: 401 when the caller
//! could not be authenticated, 403 when a verified request names a callback
//! destination we refuse, 400 for bodies that do not parse or validate.
//! Anything broken on our side renders as a 500, with the cause withheld in
//! production.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Internal(String),

    #[error("queue: {0}")]
    Queue(#[from] stemsplit_queue::QueueError),
}

impl ApiError {
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Failures whose cause stays server-side.
    fn is_infra(&self) -> bool {
        matches!(self, ApiError::Internal(_) | ApiError::Queue(_))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) | ApiError::Queue(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let redact = self.is_infra()
            && std::env::var("ENVIRONMENT")
                .map(|v| v == "production")
                .unwrap_or(false);
        let detail = if redact {
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        };

        (status, Json(json!({ "detail": detail }))).into_response()
    }
}
