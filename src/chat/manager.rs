//! Chat session manager
//!
//! Registry of attached [`ChatSession`]s keyed by session id. Attaching never
//! reuses a connection: a repeated attach for the same id closes the previous
//! socket and opens a new one.

use super::error::ChatError;
use super::session::{ChatEndpoint, ChatSession};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Manages chat sessions
pub struct ChatSessionManager {
    /// Map from session_id to ChatSession
    sessions: Arc<RwLock<HashMap<String, Arc<ChatSession>>>>,
    /// Backend endpoint used for every session
    endpoint: ChatEndpoint,
}

impl ChatSessionManager {
    /// Create a manager for the given chat backend
    pub fn new(endpoint: ChatEndpoint) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            endpoint,
        }
    }

    /// Attach a fresh connection for a session
    ///
    /// # Errors
    /// * `ChatError::MissingCredential` if no chat token is configured; nothing
    ///   is attached in that case
    pub async fn attach(&self, session_id: &str) -> Result<Arc<ChatSession>, ChatError> {
        if self.endpoint.token().is_none() {
            warn!(session_id = %session_id, "Cannot attach chat session: no chat token");
            return Err(ChatError::MissingCredential("chat token".to_string()));
        }

        let session = Arc::new(ChatSession::attach(&self.endpoint, session_id));
        let previous = self
            .sessions
            .write()
            .await
            .insert(session_id.to_string(), session.clone());

        if let Some(previous) = previous {
            debug!(session_id = %session_id, "Closing previous connection for session");
            previous.detach().await;
        }

        info!(session_id = %session_id, "Chat session created and stored");
        Ok(session)
    }

    /// Get an attached session
    pub async fn get(&self, session_id: &str) -> Option<Arc<ChatSession>> {
        self.sessions.read().await.get(session_id).cloned()
    }

    /// Send text on a session
    ///
    /// Returns `None` if the session is unknown, otherwise whether the message
    /// was accepted (see [`ChatSession::send`]).
    pub async fn send(&self, session_id: &str, text: &str) -> Option<bool> {
        let session = self.get(session_id).await?;
        Some(session.send(text))
    }

    /// Close and forget a session
    ///
    /// Returns whether a session existed.
    pub async fn detach(&self, session_id: &str) -> bool {
        let removed = self.sessions.write().await.remove(session_id);
        match removed {
            Some(session) => {
                session.detach().await;
                true
            }
            None => {
                debug!(session_id = %session_id, "No chat session to detach");
                false
            }
        }
    }

    /// Close every session (for graceful shutdown)
    pub async fn detach_all(&self) {
        info!("Detaching all chat sessions");
        let drained: Vec<Arc<ChatSession>> = {
            let mut sessions = self.sessions.write().await;
            sessions.drain().map(|(_, session)| session).collect()
        };
        for session in drained {
            session.detach().await;
        }
    }

    /// Number of attached sessions
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}
