//! Room sync API handlers
//!
//! Attach, read and detach protocol room transcripts.

use crate::error::AppError;
use crate::message::Message;
use crate::state::AppState;
use crate::sync::SyncSnapshot;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Response to an attach request
#[derive(Debug, Serialize)]
pub struct RoomAttachResponse {
    /// Room id
    pub room_id: String,
    /// Whether the poller is running
    pub active: bool,
}

/// Query parameters for reading a transcript
#[derive(Debug, Default, Deserialize)]
pub struct TranscriptQuery {
    /// Include entries without displayable content
    #[serde(default)]
    pub all: bool,
}

/// Room transcript response
#[derive(Debug, Serialize)]
pub struct RoomTranscriptResponse {
    /// Room id
    pub room_id: String,
    /// Messages in display order
    pub messages: Vec<Message>,
    /// Number of messages returned
    pub count: usize,
    /// Current sync cursor
    pub next_batch: Option<String>,
    /// Most recent sync failure
    pub last_error: Option<String>,
    /// Whether the history page has been merged
    pub history_loaded: bool,
    /// Whether the poller is running
    pub active: bool,
}

impl RoomTranscriptResponse {
    /// Build a response from a snapshot, optionally hiding empty entries
    pub fn from_snapshot(snapshot: SyncSnapshot, include_hidden: bool) -> Self {
        let messages = if include_hidden {
            snapshot.messages
        } else {
            snapshot.visible_messages()
        };
        Self {
            room_id: snapshot.room_id,
            count: messages.len(),
            messages,
            next_batch: snapshot.next_batch,
            last_error: snapshot.last_error,
            history_loaded: snapshot.history_loaded,
            active: snapshot.active,
        }
    }
}

/// Detach response
#[derive(Debug, Serialize)]
pub struct DetachResponse {
    /// Human-readable message
    pub message: String,
    /// Whether something was attached before the call
    pub detached: bool,
}

/// POST /api/rooms/:room_id/attach - Start (or reuse) a room poller
pub async fn attach_room(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
) -> Result<(StatusCode, Json<RoomAttachResponse>), AppError> {
    if room_id.trim().is_empty() {
        return Err(AppError::InvalidRequest("Room id cannot be empty".to_string()));
    }

    let poller = state.rooms.attach(&room_id).await?;

    Ok((
        StatusCode::OK,
        Json(RoomAttachResponse {
            room_id,
            active: poller.is_active(),
        }),
    ))
}

/// GET /api/rooms/:room_id/messages - Read a room transcript
pub async fn get_room_messages(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
    Query(query): Query<TranscriptQuery>,
) -> Result<Json<RoomTranscriptResponse>, AppError> {
    let poller = state
        .rooms
        .get(&room_id)
        .await
        .ok_or_else(|| AppError::RoomNotFound(room_id.clone()))?;

    Ok(Json(RoomTranscriptResponse::from_snapshot(
        poller.snapshot(),
        query.all,
    )))
}

/// DELETE /api/rooms/:room_id - Stop syncing a room
pub async fn detach_room(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
) -> Json<DetachResponse> {
    let detached = state.rooms.detach(&room_id).await;
    Json(DetachResponse {
        message: format!("Room {} detached", room_id),
        detached,
    })
}
