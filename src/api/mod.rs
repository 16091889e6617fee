//! API module
//!
//! HTTP handlers exposing chat sessions and room transcripts to presentation
//! components, plus the router that wires them together.

pub mod rooms;
pub mod sessions;

use crate::state::AppState;
use crate::websocket;
use axum::{
    extract::State,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    /// Health indicator
    pub status: String,
    /// Crate version
    pub version: String,
    /// Number of attached chat sessions
    pub sessions: usize,
    /// Number of attached rooms
    pub rooms: usize,
}

/// GET /api/health - Liveness and attachment counts
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        sessions: state.chat.session_count().await,
        rooms: state.rooms.room_count().await,
    })
}

/// Build the gateway router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        // Protocol rooms
        .route("/api/rooms/:room_id/attach", post(rooms::attach_room))
        .route("/api/rooms/:room_id/messages", get(rooms::get_room_messages))
        .route("/api/rooms/:room_id", delete(rooms::detach_room))
        // Chat sessions
        .route(
            "/api/sessions/:session_id/attach",
            post(sessions::attach_session),
        )
        .route(
            "/api/sessions/:session_id/messages",
            get(sessions::get_session_messages).post(sessions::send_session_message),
        )
        .route("/api/sessions/:session_id", delete(sessions::detach_session))
        // Live feeds
        .route("/ws/rooms/:room_id", get(websocket::room_feed_handler))
        .route(
            "/ws/sessions/:session_id",
            get(websocket::session_feed_handler),
        )
        .with_state(state)
}
