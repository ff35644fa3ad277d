//! Unified error handling for the server.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Rejection of a sync trigger.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    #[error("a sync round is already running")]
    AlreadyRunning,
}

/// Application error type.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Engine error: {0}")]
    Engine(#[from] quotesync_engine::Error),

    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response body.
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        use quotesync_engine::Error as EngineError;

        let (status, error_message, details) = match &self {
            AppError::Engine(e @ EngineError::Validation(_)) => {
                (StatusCode::BAD_REQUEST, e.to_string(), None)
            }
            AppError::Engine(e @ EngineError::Duplicate { .. }) => {
                (StatusCode::CONFLICT, e.to_string(), None)
            }
            AppError::Engine(e @ EngineError::ConflictNotFound(_)) => {
                (StatusCode::NOT_FOUND, e.to_string(), None)
            }
            AppError::Engine(e @ EngineError::InvalidSnapshot(_)) => {
                tracing::error!("Engine error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Engine error".to_string(),
                    None,
                )
            }
            AppError::Sync(e) => (StatusCode::CONFLICT, e.to_string(), None),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone(), None),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone(), None),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    Some(msg.clone()),
                )
            }
        };

        let body = Json(ErrorResponse {
            error: error_message,
            details,
        });

        (status, body).into_response()
    }
}

/// Result type alias for handlers.
pub type Result<T> = std::result::Result<T, AppError>;
