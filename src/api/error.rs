//! Request-boundary errors and their JSON rendering.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// Error returned to the caller as `{"error": <message>}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The payload was missing, malformed or empty.
    #[error("{0}")]
    BadRequest(String),

    /// The batch could not run.
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    /// Creates a bad-request error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// HTTP status this error maps to.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// JSON body sent for this error.
    #[must_use]
    pub fn body(&self) -> serde_json::Value {
        json!({ "error": self.to_string() })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}
