//! Chat session API handlers
//!
//! Attach, read, send on and detach chat sessions.

use crate::api::rooms::DetachResponse;
use crate::chat::{ChatSnapshot, ConnectionState};
use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Maximum outgoing message length in characters
pub const MAX_MESSAGE_LENGTH: usize = 10_000;

/// Response to an attach request
#[derive(Debug, Serialize)]
pub struct SessionAttachResponse {
    /// Session id
    pub session_id: String,
    /// Connection state right after attach
    pub connection_state: ConnectionState,
}

/// Send message request
#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    /// Raw text to send
    pub text: String,
}

/// Send message response
#[derive(Debug, Serialize)]
pub struct SendMessageResponse {
    /// False when the socket was not open and nothing was sent
    pub accepted: bool,
}

/// Validate outgoing text
///
/// # Returns
/// * `Ok(())` - Text is valid
/// * `Err(AppError)` - Text is empty or too long
pub fn validate_message(text: &str) -> Result<(), AppError> {
    if text.trim().is_empty() {
        return Err(AppError::InvalidRequest(
            "Message cannot be empty".to_string(),
        ));
    }
    if text.chars().count() > MAX_MESSAGE_LENGTH {
        return Err(AppError::InvalidRequest(format!(
            "Message exceeds maximum length of {} characters",
            MAX_MESSAGE_LENGTH
        )));
    }
    Ok(())
}

/// POST /api/sessions/:session_id/attach - Open a fresh chat connection
pub async fn attach_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<(StatusCode, Json<SessionAttachResponse>), AppError> {
    if session_id.trim().is_empty() {
        return Err(AppError::InvalidRequest(
            "Session id cannot be empty".to_string(),
        ));
    }

    let session = state.chat.attach(&session_id).await?;

    Ok((
        StatusCode::CREATED,
        Json(SessionAttachResponse {
            session_id,
            connection_state: session.connection_state(),
        }),
    ))
}

/// GET /api/sessions/:session_id/messages - Read a chat transcript
pub async fn get_session_messages(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<ChatSnapshot>, AppError> {
    let session = state
        .chat
        .get(&session_id)
        .await
        .ok_or_else(|| AppError::SessionNotFound(session_id.clone()))?;

    Ok(Json(session.snapshot()))
}

/// POST /api/sessions/:session_id/messages - Send a user message
pub async fn send_session_message(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(request): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<SendMessageResponse>), AppError> {
    validate_message(&request.text)?;

    let accepted = state
        .chat
        .send(&session_id, &request.text)
        .await
        .ok_or_else(|| AppError::SessionNotFound(session_id.clone()))?;

    Ok((StatusCode::ACCEPTED, Json(SendMessageResponse { accepted })))
}

/// DELETE /api/sessions/:session_id - Close a chat session
pub async fn detach_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Json<DetachResponse> {
    let detached = state.chat.detach(&session_id).await;
    Json(DetachResponse {
        message: format!("Session {} detached", session_id),
        detached,
    })
}
