use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chess_core::{IllegalMoveError, ParseError};
use serde_json::json;

/// Per-request failures inside the relay. Each one is reported to the
/// connection that caused it and never affects other sessions.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    IllegalMove(#[from] IllegalMoveError),

    #[error("Game {0} already exists")]
    DuplicateId(String),

    #[error("Game {0} not found")]
    NotFound(String),

    #[error("{0}")]
    Role(String),

    #[error("{0}")]
    Invalid(String),

    #[error("Connection closed")]
    Connection,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl From<RelayError> for AppError {
    fn from(err: RelayError) -> Self {
        match err {
            RelayError::NotFound(_) => AppError::NotFound(err.to_string()),
            RelayError::DuplicateId(_) | RelayError::Role(_) => AppError::Conflict(err.to_string()),
            RelayError::Parse(_) | RelayError::IllegalMove(_) | RelayError::Invalid(_) => {
                AppError::BadRequest(err.to_string())
            }
            RelayError::Connection => AppError::Internal(err.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {msg}");
                (StatusCode::INTERNAL_SERVER_ERROR, msg.clone())
            }
            AppError::Anyhow(e) => {
                tracing::error!("Unexpected error: {e}");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        (status, Json(json!({ "detail": message }))).into_response()
    }
}
