// Application state shared by gateway handlers
// Holds the chat session and room sync registries

use crate::chat::ChatSessionManager;
use crate::config::Config;
use crate::sync::{HttpSyncClient, RoomSyncManager, SyncError, SyncTransport};
use std::sync::Arc;
use tracing::warn;

/// Main application state
///
/// Both registries synchronize internally, so the state itself is shared
/// behind a plain `Arc`.
pub struct AppState {
    /// Chat sessions keyed by session id
    pub chat: ChatSessionManager,
    /// Room pollers keyed by room id
    pub rooms: RoomSyncManager,
}

impl AppState {
    /// Create state from explicit registries
    pub fn new(chat: ChatSessionManager, rooms: RoomSyncManager) -> Self {
        Self { chat, rooms }
    }

    /// Build state from configuration
    ///
    /// A missing protocol token is not a startup error: rooms then fail fast
    /// on attach instead.
    ///
    /// # Errors
    /// * `SyncError::InvalidUrl` if the protocol API URL is malformed
    pub fn from_config(config: &Config, http: reqwest::Client) -> Result<Self, SyncError> {
        let transport: Option<Arc<dyn SyncTransport>> = match HttpSyncClient::new(
            http,
            &config.protocol.api_url,
            config.protocol.access_token.as_deref(),
        ) {
            Ok(client) => {
                let client: Arc<dyn SyncTransport> =
                    Arc::new(client.with_timeline_limit(config.protocol.sync.history_limit));
                Some(client)
            }
            Err(SyncError::MissingCredential(what)) => {
                warn!(credential = %what, "No protocol credential configured; room sync disabled");
                None
            }
            Err(e) => return Err(e),
        };

        Ok(Self::new(
            ChatSessionManager::new(config.chat_endpoint()),
            RoomSyncManager::new(transport, config.protocol.sync.clone()),
        ))
    }

    /// Detach every chat session and room poller
    pub async fn shutdown(&self) {
        self.chat.detach_all().await;
        self.rooms.detach_all().await;
    }
}
