//! WebSocket feeds for presentation components
//!
//! Streams room and chat-session snapshots to connected clients: the current
//! snapshot on connect, then one message per change. Supports ping/pong for
//! connection keepalive.

use crate::chat::ChatSnapshot;
use crate::error::AppError;
use crate::state::AppState;
use crate::sync::SyncSnapshot;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::{error, info, warn};

/// Interval between keepalive pings
const PING_INTERVAL: std::time::Duration = std::time::Duration::from_secs(30);

/// Messages pushed to feed clients
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type")]
pub enum FeedMessage {
    /// Current state of a room
    #[serde(rename = "room_snapshot")]
    RoomSnapshot {
        /// Room state
        snapshot: SyncSnapshot,
    },
    /// Current state of a chat session
    #[serde(rename = "session_snapshot")]
    SessionSnapshot {
        /// Session state
        snapshot: ChatSnapshot,
    },
    /// Pong message responding to ping
    #[serde(rename = "pong")]
    Pong,
}

/// Messages accepted from feed clients
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum FeedCommand {
    /// Ping message for connection keepalive
    #[serde(rename = "ping")]
    Ping,
}

/// GET /ws/rooms/:room_id - Live room transcript feed
pub async fn room_feed_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
) -> Result<Response, AppError> {
    let poller = state
        .rooms
        .get(&room_id)
        .await
        .ok_or_else(|| AppError::RoomNotFound(room_id.clone()))?;
    let updates = poller.subscribe();

    Ok(ws.on_upgrade(move |socket| {
        handle_feed(socket, room_id, updates, |snapshot| FeedMessage::RoomSnapshot {
            snapshot,
        })
    }))
}

/// GET /ws/sessions/:session_id - Live chat session feed
pub async fn session_feed_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Response, AppError> {
    let session = state
        .chat
        .get(&session_id)
        .await
        .ok_or_else(|| AppError::SessionNotFound(session_id.clone()))?;
    let updates = session.subscribe();

    Ok(ws.on_upgrade(move |socket| {
        handle_feed(socket, session_id, updates, |snapshot| {
            FeedMessage::SessionSnapshot { snapshot }
        })
    }))
}

// Handle one feed connection
async fn handle_feed<T, F>(
    socket: WebSocket,
    feed_id: String,
    updates: watch::Receiver<T>,
    wrap: F,
) where
    T: Clone + Send + Sync + 'static,
    F: Fn(T) -> FeedMessage + Send + 'static,
{
    let (mut sender, mut receiver) = socket.split();
    info!(feed_id = %feed_id, "Feed client connected");

    // Use a channel so snapshots, pings and pongs share one sender
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<Message>();

    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Err(e) = sender.send(msg).await {
                error!("Failed to send feed message: {}", e);
                break;
            }
        }
    });

    // Forward the current snapshot and every change
    let update_tx = tx.clone();
    let mut update_task = tokio::spawn(async move {
        let mut stream = WatchStream::new(updates);
        while let Some(snapshot) = stream.next().await {
            match serde_json::to_string(&wrap(snapshot)) {
                Ok(json) => {
                    if update_tx.send(Message::Text(json)).is_err() {
                        break;
                    }
                }
                Err(e) => error!("Failed to serialize snapshot: {}", e),
            }
        }
    });

    let ping_tx = tx.clone();
    let mut ping_task = tokio::spawn(async move {
        loop {
            tokio::time::sleep(PING_INTERVAL).await;
            if ping_tx.send(Message::Ping(vec![])).is_err() {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => match serde_json::from_str::<FeedCommand>(&text) {
                    Ok(FeedCommand::Ping) => {
                        if let Ok(pong) = serde_json::to_string(&FeedMessage::Pong) {
                            if tx.send(Message::Text(pong)).is_err() {
                                break;
                            }
                        }
                    }
                    Err(_) => warn!("Received unhandled feed message: {}", text),
                },
                Ok(Message::Close(_)) => break,
                Err(e) => {
                    error!("Feed socket error: {}", e);
                    break;
                }
                _ => {}
            }
        }
    });

    // Wait for any task to complete
    tokio::select! {
        _ = &mut send_task => {
            update_task.abort();
            ping_task.abort();
            recv_task.abort();
        }
        _ = &mut update_task => {
            send_task.abort();
            ping_task.abort();
            recv_task.abort();
        }
        _ = &mut ping_task => {
            send_task.abort();
            update_task.abort();
            recv_task.abort();
        }
        _ = &mut recv_task => {
            send_task.abort();
            update_task.abort();
            ping_task.abort();
        }
    }

    info!(feed_id = %feed_id, "Feed connection closed");
}
