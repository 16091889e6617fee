//! Error types and error handling for the gateway
//!
//! This module defines the error type returned by HTTP handlers. It implements
//! `IntoResponse` to provide consistent JSON error formatting.

use crate::chat::ChatError;
use crate::sync::SyncError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Gateway-level error types
#[derive(Error, Debug)]
pub enum AppError {
    /// No poller is attached for the room
    #[error("Room not attached: {0}")]
    RoomNotFound(String),

    /// No chat session is attached for the id
    #[error("Chat session not attached: {0}")]
    SessionNotFound(String),

    /// Request body or parameters are invalid
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Protocol sync failure
    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    /// Chat session failure
    #[error("Chat error: {0}")]
    Chat(#[from] ChatError),

    /// Internal server error (catch-all for unexpected errors)
    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::RoomNotFound(_) | AppError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Sync(SyncError::MissingCredential(_))
            | AppError::Sync(SyncError::Unauthorized { .. })
            | AppError::Chat(ChatError::MissingCredential(_)) => StatusCode::UNAUTHORIZED,
            AppError::Sync(_) | AppError::Chat(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}
