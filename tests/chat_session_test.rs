//! Tests for chat sessions against an in-process WebSocket backend

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket},
        Path, Query, State, WebSocketUpgrade,
    },
    response::Response,
    routing::get,
    Router,
};
use care_sync::chat::{
    ChatEndpoint, ChatError, ChatSession, ChatSessionManager, ChatSnapshot, ConnectionState,
};
use care_sync::message::{MessageRole, MessageStatus};
use serde_json::json;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

/// What the fake backend has observed
#[derive(Clone, Default)]
struct Backend {
    received: Arc<Mutex<Vec<String>>>,
    tokens: Arc<Mutex<Vec<String>>>,
    closed: Arc<Mutex<Vec<String>>>,
}

impl Backend {
    fn received(&self) -> Vec<String> {
        self.received.lock().unwrap().clone()
    }
}

async fn chat_handler(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    State(backend): State<Backend>,
) -> Response {
    backend
        .tokens
        .lock()
        .unwrap()
        .push(query.get("token").cloned().unwrap_or_default());
    ws.on_upgrade(move |socket| serve_chat(socket, session_id, backend))
}

async fn serve_chat(mut socket: WebSocket, session_id: String, backend: Backend) {
    if session_id == "closing" {
        let _ = socket.send(WsMessage::Close(None)).await;
        return;
    }

    let history = json!({
        "type": "history",
        "messages": [
            {"role": "assistant", "content": "later", "timestamp": "2024-01-01T00:00:02Z"},
            {"role": "user", "content": "earlier", "timestamp": "2024-01-01T00:00:01Z"}
        ]
    });
    if socket.send(WsMessage::Text(history.to_string())).await.is_err() {
        return;
    }
    if socket.send(WsMessage::Text("hello".to_string())).await.is_err() {
        return;
    }

    while let Some(Ok(msg)) = socket.recv().await {
        match msg {
            WsMessage::Text(text) => backend.received.lock().unwrap().push(text),
            WsMessage::Close(_) => break,
            _ => {}
        }
    }
    backend.closed.lock().unwrap().push(session_id);
}

async fn spawn_backend() -> (SocketAddr, Backend) {
    let backend = Backend::default();
    let app = Router::new()
        .route("/ws/chat/:session_id", get(chat_handler))
        .with_state(backend.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, backend)
}

fn endpoint(addr: SocketAddr) -> ChatEndpoint {
    ChatEndpoint::new(format!("ws://{}", addr), Some("secret".to_string()))
}

async fn wait_for_chat(
    rx: &mut watch::Receiver<ChatSnapshot>,
    predicate: impl FnMut(&ChatSnapshot) -> bool,
) -> ChatSnapshot {
    tokio::time::timeout(Duration::from_secs(10), rx.wait_for(predicate))
        .await
        .expect("chat condition not reached in time")
        .expect("session dropped its sender")
        .clone()
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

fn texts(snapshot: &ChatSnapshot) -> Vec<&str> {
    snapshot
        .messages
        .iter()
        .map(|m| m.content.as_text().unwrap_or(""))
        .collect()
}

#[tokio::test]
async fn test_history_then_live_message() {
    let (addr, backend) = spawn_backend().await;
    let session = ChatSession::attach(&endpoint(addr), "s1");
    let mut rx = session.subscribe();

    let snapshot = wait_for_chat(&mut rx, |s| s.history_loaded && s.messages.len() == 3).await;

    assert_eq!(snapshot.connection_state, ConnectionState::Open);
    assert_eq!(texts(&snapshot), vec!["earlier", "later", "hello"]);
    assert_eq!(snapshot.messages[0].role, MessageRole::User);
    assert_eq!(snapshot.messages[2].role, MessageRole::Assistant);
    assert_eq!(backend.tokens.lock().unwrap().as_slice(), ["secret"]);

    session.detach().await;
}

#[tokio::test]
async fn test_send_echoes_locally_and_reaches_server() {
    let (addr, backend) = spawn_backend().await;
    let session = ChatSession::attach(&endpoint(addr), "s1");
    let mut rx = session.subscribe();
    wait_for_chat(&mut rx, |s| s.history_loaded && s.messages.len() == 3).await;

    assert!(session.send("how are you?"));

    // The echo is visible before the server has answered.
    let snapshot = session.snapshot();
    let echo = snapshot.messages.last().unwrap();
    assert_eq!(echo.role, MessageRole::User);
    assert_eq!(echo.status, Some(MessageStatus::Sent));
    assert_eq!(echo.content.as_text(), Some("how are you?"));

    wait_until(|| backend.received() == vec!["how are you?".to_string()]).await;

    session.detach().await;
}

#[tokio::test]
async fn test_send_before_open_is_dropped() {
    // Accepts TCP connections but never completes the WebSocket handshake.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let session = ChatSession::attach(&endpoint(addr), "s1");

    assert_eq!(session.connection_state(), ConnectionState::Connecting);
    assert!(!session.send("too early"));
    assert!(session.snapshot().messages.is_empty());

    session.detach().await;
    assert_eq!(session.connection_state(), ConnectionState::Closed);
    drop(listener);
}

#[tokio::test]
async fn test_missing_token_enters_error() {
    let session = ChatSession::attach(&ChatEndpoint::new("ws://127.0.0.1:9", None), "s1");

    assert_eq!(session.connection_state(), ConnectionState::Error);
    assert!(!session.send("hello"));

    // Detaching a session that never connected is harmless.
    session.detach().await;
    assert_eq!(session.connection_state(), ConnectionState::Error);
}

#[tokio::test]
async fn test_connection_refused_enters_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let session = ChatSession::attach(&endpoint(addr), "s1");
    let mut rx = session.subscribe();

    let snapshot = wait_for_chat(&mut rx, |s| s.connection_state.is_terminal()).await;
    assert_eq!(snapshot.connection_state, ConnectionState::Error);

    session.detach().await;
}

#[tokio::test]
async fn test_detach_closes_socket_and_is_idempotent() {
    let (addr, backend) = spawn_backend().await;
    let session = ChatSession::attach(&endpoint(addr), "s1");
    let mut rx = session.subscribe();
    wait_for_chat(&mut rx, |s| s.connection_state == ConnectionState::Open).await;

    session.detach().await;
    session.detach().await;

    assert_eq!(session.connection_state(), ConnectionState::Closed);
    assert!(!session.send("after close"));
    wait_until(|| backend.closed.lock().unwrap().len() == 1).await;
}

#[tokio::test]
async fn test_server_close_moves_to_closed() {
    let (addr, _backend) = spawn_backend().await;
    let session = ChatSession::attach(&endpoint(addr), "closing");
    let mut rx = session.subscribe();

    let snapshot = wait_for_chat(&mut rx, |s| s.connection_state.is_terminal()).await;
    assert_eq!(snapshot.connection_state, ConnectionState::Closed);

    session.detach().await;
}

#[tokio::test]
async fn test_manager_reattach_replaces_connection() {
    let (addr, backend) = spawn_backend().await;
    let manager = ChatSessionManager::new(endpoint(addr));

    let first = manager.attach("s1").await.unwrap();
    let mut first_rx = first.subscribe();
    wait_for_chat(&mut first_rx, |s| s.connection_state == ConnectionState::Open).await;

    let second = manager.attach("s1").await.unwrap();

    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(first.connection_state(), ConnectionState::Closed);
    assert_eq!(manager.session_count().await, 1);

    let mut second_rx = second.subscribe();
    wait_for_chat(&mut second_rx, |s| s.history_loaded).await;
    assert_eq!(manager.send("s1", "again").await, Some(true));
    assert_eq!(manager.send("unknown", "again").await, None);
    wait_until(|| backend.received() == vec!["again".to_string()]).await;

    manager.detach_all().await;
    assert_eq!(manager.session_count().await, 0);
    assert_eq!(second.connection_state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_manager_without_token_attaches_nothing() {
    let manager = ChatSessionManager::new(ChatEndpoint::new("ws://127.0.0.1:9", None));

    let result = manager.attach("s1").await;

    assert!(matches!(result, Err(ChatError::MissingCredential(_))));
    assert_eq!(manager.session_count().await, 0);
}
