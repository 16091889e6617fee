//! Chat session
//!
//! Owns one WebSocket connection to the chat backend for a single session id.
//! The server pushes a one-shot `history` envelope followed by live messages;
//! the client sends raw text and echoes it locally right away.
//!
//! Each attach spawns one connection task that owns the socket. The message
//! list and connection state are published through a `watch` channel.

use crate::chat::error::ChatError;
use crate::message::{
    normalize_chat_envelope, parse_chat_frame, ChatFrame, IngestContext, Message, MessageContent,
    MessageRole, MessageStatus,
};
use futures_util::{SinkExt, StreamExt};
use reqwest::Url;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How long to wait for the close frame to go out on detach
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Where chat sessions connect
#[derive(Debug, Clone)]
pub struct ChatEndpoint {
    /// Base URL, e.g. `wss://chat.example.org`
    pub base_url: String,
    /// Token appended as `?token=`; required
    pub token: Option<String>,
}

impl ChatEndpoint {
    /// Create an endpoint
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token,
        }
    }

    /// Token, if a non-blank one is configured
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref().filter(|t| !t.trim().is_empty())
    }

    /// Socket URL for a session: `{base}/ws/chat/{sessionId}?token=...`
    ///
    /// # Errors
    /// * `ChatError::MissingCredential` if no token is configured
    /// * `ChatError::InvalidEndpoint` if the base URL is not usable
    pub fn session_url(&self, session_id: &str) -> Result<Url, ChatError> {
        let token = self
            .token()
            .ok_or_else(|| ChatError::MissingCredential("chat token".to_string()))?;
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| ChatError::InvalidEndpoint(format!("{}: {}", self.base_url, e)))?;

        url.path_segments_mut()
            .map_err(|_| ChatError::InvalidEndpoint(self.base_url.clone()))?
            .pop_if_empty()
            .extend(["ws", "chat", session_id]);
        url.query_pairs_mut().append_pair("token", token);
        Ok(url)
    }
}

/// Lifecycle of a chat connection
///
/// Moves strictly forward: `connecting -> open -> (closed | error)`. Only a
/// fresh attach starts over at `connecting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Handshake in progress
    Connecting,
    /// Socket is open
    Open,
    /// Socket closed by either side
    Closed,
    /// Socket failed
    Error,
}

impl ConnectionState {
    /// Whether no further transition is possible
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::Closed | ConnectionState::Error)
    }

    fn can_advance_to(self, next: ConnectionState) -> bool {
        match self {
            ConnectionState::Connecting => next != ConnectionState::Connecting,
            ConnectionState::Open => next.is_terminal(),
            ConnectionState::Closed | ConnectionState::Error => false,
        }
    }
}

/// Observable state of one chat session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatSnapshot {
    /// Session id
    pub session_id: String,
    /// Current connection state
    pub connection_state: ConnectionState,
    /// Whether the server's history envelope has been processed
    pub history_loaded: bool,
    /// Messages in display order
    pub messages: Vec<Message>,
}

/// Handle to one attached chat session
pub struct ChatSession {
    session_id: String,
    shared: Arc<watch::Sender<ChatSnapshot>>,
    outbound: mpsc::UnboundedSender<String>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ChatSession {
    /// Open a new connection for `session_id`
    ///
    /// Always creates a brand-new socket. When no token is configured the
    /// session enters `error` immediately and never connects. Must be called
    /// within a Tokio runtime.
    pub fn attach(endpoint: &ChatEndpoint, session_id: impl Into<String>) -> Self {
        let session_id = session_id.into();
        let (snapshot_tx, _) = watch::channel(ChatSnapshot {
            session_id: session_id.clone(),
            connection_state: ConnectionState::Connecting,
            history_loaded: false,
            messages: Vec::new(),
        });
        let shared = Arc::new(snapshot_tx);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let task = match endpoint.session_url(&session_id) {
            Ok(url) => {
                info!(session_id = %session_id, "Attaching chat session");
                Some(tokio::spawn(run_connection(
                    session_id.clone(),
                    url.to_string(),
                    shared.clone(),
                    outbound_rx,
                    cancel.child_token(),
                )))
            }
            Err(e) => {
                error!(session_id = %session_id, error = %e, "Cannot attach chat session");
                transition(&shared, ConnectionState::Error);
                None
            }
        };

        Self {
            session_id,
            shared,
            outbound: outbound_tx,
            cancel,
            task: Mutex::new(task),
        }
    }

    /// Session id
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Current connection state
    pub fn connection_state(&self) -> ConnectionState {
        self.shared.borrow().connection_state
    }

    /// Current state and messages
    pub fn snapshot(&self) -> ChatSnapshot {
        self.shared.borrow().clone()
    }

    /// Receiver notified on every change
    pub fn subscribe(&self) -> watch::Receiver<ChatSnapshot> {
        self.shared.subscribe()
    }

    /// Send a user message
    ///
    /// Only allowed while the socket is open; otherwise nothing is sent or
    /// echoed and `false` is returned. When allowed, the raw text goes out on
    /// the socket and a local `user` message with status `sent` is appended
    /// immediately, without waiting for the server. A server echo of the same
    /// text will therefore show up as a second entry.
    pub fn send(&self, text: &str) -> bool {
        if self.connection_state() != ConnectionState::Open {
            debug!(session_id = %self.session_id, "Dropping send: socket not open");
            return false;
        }
        if self.outbound.send(text.to_string()).is_err() {
            debug!(session_id = %self.session_id, "Dropping send: connection task gone");
            return false;
        }

        let ctx = IngestContext::now();
        let echo = Message {
            id: ctx.fallback_id,
            role: MessageRole::User,
            content: MessageContent::text(text),
            timestamp: ctx.received_at,
            status: Some(MessageStatus::Sent),
        };
        self.shared.send_modify(|s| s.messages.push(echo));
        true
    }

    /// Close the socket
    ///
    /// Idempotent; waits for the connection task to finish.
    pub async fn detach(&self) {
        self.cancel.cancel();

        let task = self.task.lock().await.take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(session_id = %self.session_id, error = %e, "Chat connection task ended abnormally");
            }
            info!(session_id = %self.session_id, "Chat session detached");
        }
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn transition(shared: &watch::Sender<ChatSnapshot>, next: ConnectionState) -> bool {
    shared.send_if_modified(|s| {
        if s.connection_state.can_advance_to(next) {
            s.connection_state = next;
            true
        } else {
            false
        }
    })
}

async fn run_connection(
    session_id: String,
    url: String,
    shared: Arc<watch::Sender<ChatSnapshot>>,
    mut outbound: mpsc::UnboundedReceiver<String>,
    cancel: CancellationToken,
) {
    debug!(session_id = %session_id, "Connecting chat socket");

    let connected = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            transition(&shared, ConnectionState::Closed);
            return;
        }
        result = connect_async(url.as_str()) => result.map_err(ChatError::from),
    };

    let socket = match connected {
        Ok((socket, _response)) => socket,
        Err(e) => {
            warn!(session_id = %session_id, error = %e, "Chat socket failed to connect");
            transition(&shared, ConnectionState::Error);
            return;
        }
    };

    transition(&shared, ConnectionState::Open);
    info!(session_id = %session_id, "Chat socket open");

    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                let _ = tokio::time::timeout(CLOSE_TIMEOUT, sink.send(WsMessage::Close(None))).await;
                transition(&shared, ConnectionState::Closed);
                break;
            }
            Some(text) = outbound.recv() => {
                if let Err(e) = sink.send(WsMessage::Text(text)).await {
                    warn!(session_id = %session_id, error = %e, "Failed to send chat message");
                    transition(&shared, ConnectionState::Error);
                    break;
                }
            }
            frame = stream.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => ingest_frame(&shared, &text),
                Some(Ok(WsMessage::Binary(bytes))) => {
                    ingest_frame(&shared, &String::from_utf8_lossy(&bytes));
                }
                Some(Ok(WsMessage::Close(_))) | None => {
                    info!(session_id = %session_id, "Chat socket closed by server");
                    transition(&shared, ConnectionState::Closed);
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(session_id = %session_id, error = %e, "Chat socket error");
                    transition(&shared, ConnectionState::Error);
                    break;
                }
            },
        }
    }
}

/// Apply one inbound text frame to the session state
fn ingest_frame(shared: &watch::Sender<ChatSnapshot>, text: &str) {
    match parse_chat_frame(text) {
        ChatFrame::History(entries) => {
            // One receipt time for the whole batch keeps undated entries in server order.
            let received_at = chrono::Utc::now().timestamp_millis();
            let mut messages: Vec<Message> = entries
                .iter()
                .filter_map(|entry| {
                    let ctx = IngestContext::new(uuid::Uuid::new_v4().to_string(), received_at);
                    normalize_chat_envelope(entry, &ctx)
                })
                .collect();
            messages.sort_by_key(|m| m.timestamp);

            debug!(count = messages.len(), "Replacing chat transcript from history");
            shared.send_modify(|s| {
                s.messages = messages;
                s.history_loaded = true;
            });
        }
        ChatFrame::Single(value) => {
            if let Some(message) = normalize_chat_envelope(&value, &IngestContext::now()) {
                shared.send_modify(|s| s.messages.push(message));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> watch::Sender<ChatSnapshot> {
        let (tx, _) = watch::channel(ChatSnapshot {
            session_id: "s1".to_string(),
            connection_state: ConnectionState::Open,
            history_loaded: false,
            messages: Vec::new(),
        });
        tx
    }

    fn texts(shared: &watch::Sender<ChatSnapshot>) -> Vec<(MessageRole, String)> {
        shared
            .borrow()
            .messages
            .iter()
            .map(|m| (m.role.clone(), m.content.as_text().unwrap_or("").to_string()))
            .collect()
    }

    #[test]
    fn test_session_url() {
        let endpoint = ChatEndpoint::new("wss://chat.example.org/", Some("tok en".to_string()));
        let url = endpoint.session_url("abc-123").unwrap();
        assert_eq!(
            url.as_str(),
            "wss://chat.example.org/ws/chat/abc-123?token=tok+en"
        );
    }

    #[test]
    fn test_session_url_requires_token() {
        let endpoint = ChatEndpoint::new("ws://localhost:8000", None);
        assert!(matches!(
            endpoint.session_url("abc"),
            Err(ChatError::MissingCredential(_))
        ));
    }

    #[test]
    fn test_state_moves_forward_only() {
        use ConnectionState::*;
        assert!(Connecting.can_advance_to(Open));
        assert!(Connecting.can_advance_to(Error));
        assert!(Open.can_advance_to(Closed));
        assert!(!Open.can_advance_to(Connecting));
        assert!(!Closed.can_advance_to(Open));
        assert!(!Error.can_advance_to(Closed));
    }

    #[test]
    fn test_history_then_live_message() {
        let shared = snapshot();
        ingest_frame(
            &shared,
            r#"{"type":"history","messages":[{"role":"user","content":"hi","timestamp":"T1"}]}"#,
        );
        ingest_frame(&shared, "hello");

        assert!(shared.borrow().history_loaded);
        assert_eq!(
            texts(&shared),
            vec![
                (MessageRole::User, "hi".to_string()),
                (MessageRole::Assistant, "hello".to_string())
            ]
        );
    }

    #[test]
    fn test_history_sorted_and_replaces() {
        let shared = snapshot();
        ingest_frame(&shared, "stale live message");
        ingest_frame(
            &shared,
            r#"{"type":"history","messages":[
                {"role":"assistant","content":"second","timestamp":2000},
                {"role":"user","content":"first","timestamp":1000}
            ]}"#,
        );
        assert_eq!(
            texts(&shared),
            vec![
                (MessageRole::User, "first".to_string()),
                (MessageRole::Assistant, "second".to_string())
            ]
        );

        ingest_frame(&shared, r#"{"type":"history","messages":[]}"#);
        assert!(shared.borrow().messages.is_empty());
    }

    #[test]
    fn test_live_messages_append_without_resort() {
        let shared = snapshot();
        ingest_frame(&shared, r#"{"content":"late","timestamp":5000}"#);
        ingest_frame(&shared, r#"{"parts":[{"text":"early"}],"timestamp":1000}"#);
        assert_eq!(
            texts(&shared),
            vec![
                (MessageRole::Assistant, "late".to_string()),
                (MessageRole::Assistant, "early".to_string())
            ]
        );
    }
}
