//! Tessera server error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tessera_core::error::EventStoreError;
use thiserror::Error;
use tracing::error;

/// Startup errors of the server.
#[derive(Debug, Error)]
pub enum AppError {
    /// An environment variable is invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Database connection or pool error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The storage engine could not be set up.
    #[error("storage error: {0}")]
    Storage(#[from] EventStoreError),

    /// Network binding or I/O error.
    #[error("server error: {0}")]
    Server(#[from] std::io::Error),
}

/// JSON body returned for error responses.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code.
    pub error: &'static str,
    /// Human-readable error message.
    pub message: String,
}

/// HTTP-layer wrapper around `EventStoreError` that implements `IntoResponse`.
#[derive(Debug)]
pub struct ApiError(pub EventStoreError);

impl From<EventStoreError> for ApiError {
    fn from(err: EventStoreError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = match &self.0 {
            EventStoreError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            EventStoreError::UnregisteredType(_) => (StatusCode::BAD_REQUEST, "unregistered_type"),
            EventStoreError::Serialization(_) => (StatusCode::BAD_REQUEST, "serialization_error"),
            EventStoreError::ConcurrencyConflict { .. } => {
                (StatusCode::CONFLICT, "concurrency_conflict")
            }
            EventStoreError::Backend(_) => {
                error!(error = %self.0, "storage backend failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "backend_error")
            }
        };

        let body = ErrorBody {
            error: error_code,
            message: self.0.to_string(),
        };

        (status, Json(body)).into_response()
    }
}
