//! Error responses for the demo server.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Server error type.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Session store failure.
    #[error("Session error: {0}")]
    Session(#[from] sweb_session::Error),
}

/// Result type for request handlers.
pub type Result<T> = std::result::Result<T, ServerError>;

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ServerError::Session(sweb_session::Error::PersistTimeout(_)) => {
                (StatusCode::SERVICE_UNAVAILABLE, "session_store_busy")
            }
            ServerError::Session(_) => (StatusCode::INTERNAL_SERVER_ERROR, "session_error"),
        };

        let message = self.to_string();
        tracing::error!(status = %status, code, error = %message, "Server error");

        let body = ErrorResponse {
            code: code.to_string(),
            message,
        };

        (status, Json(body)).into_response()
    }
}
