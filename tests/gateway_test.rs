//! End-to-end tests for the HTTP gateway
//!
//! Serves the real router on a loopback port, with mockito standing in for
//! the protocol homeserver.

use care_sync::api;
use care_sync::chat::{ChatEndpoint, ChatSessionManager};
use care_sync::state::AppState;
use care_sync::sync::{HttpSyncClient, RoomSyncManager, SyncSettings, SyncTransport};
use mockito::{Matcher, Server, ServerGuard};
use serde_json::{json, Value};
use serial_test::serial;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

const ROOM: &str = "!r:hs";

async fn mock_homeserver() -> ServerGuard {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/rooms/!r:hs/messages")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(
            json!({"chunk": [
                {"event_id": "$2", "type": "m.room.message", "sender": "@nurse:hs",
                 "origin_server_ts": 20, "content": {"msgtype": "m.text", "body": "second"}},
                {"event_id": "$1", "type": "m.room.member", "sender": "@nurse:hs",
                 "origin_server_ts": 5, "content": {"membership": "join"}}
            ]})
            .to_string(),
        )
        .create_async()
        .await;
    // Only the very first sync carries no `since`; later polls hit no mock and back off.
    server
        .mock("GET", "/sync")
        .match_query(Matcher::Regex("^timeout=".to_string()))
        .with_status(200)
        .with_body(
            json!({"next_batch": "s1", "rooms": {"join": {ROOM: {"timeline": {"events": [
                {"event_id": "$3", "type": "m.room.message", "sender": "@doctor:hs",
                 "origin_server_ts": 30, "content": {"msgtype": "m.text", "body": "third"}}
            ]}}}}})
            .to_string(),
        )
        .create_async()
        .await;
    server
}

async fn spawn_gateway(homeserver_url: &str) -> (SocketAddr, Arc<AppState>) {
    let client = HttpSyncClient::new(reqwest::Client::new(), homeserver_url, Some("token")).unwrap();
    let transport: Arc<dyn SyncTransport> = Arc::new(client);
    let state = Arc::new(AppState::new(
        ChatSessionManager::new(ChatEndpoint::new("ws://127.0.0.1:9", None)),
        RoomSyncManager::new(Some(transport), SyncSettings::default()),
    ));

    let app = api::router(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, state)
}

#[tokio::test]
#[serial]
async fn test_room_attach_read_and_detach() {
    let homeserver = mock_homeserver().await;
    let (addr, state) = spawn_gateway(&homeserver.url()).await;
    let http = reqwest::Client::new();
    let base = format!("http://{}", addr);

    let response = http
        .post(format!("{}/api/rooms/{}/attach", base, ROOM))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["active"], true);

    let transcript = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let body: Value = http
                .get(format!("{}/api/rooms/{}/messages?all=true", base, ROOM))
                .send()
                .await
                .unwrap()
                .json()
                .await
                .unwrap();
            if body["history_loaded"] == true && body["next_batch"] == "s1" {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("room never synced");

    let ids: Vec<&str> = transcript["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["$1", "$2", "$3"]);

    // The membership event has no displayable content and is hidden by default.
    let visible: Value = http
        .get(format!("{}/api/rooms/{}/messages", base, ROOM))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(visible["count"], 2);

    let response = http
        .delete(format!("{}/api/rooms/{}", base, ROOM))
        .send()
        .await
        .unwrap();
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["detached"], true);
    assert_eq!(state.rooms.room_count().await, 0);

    let response = http
        .get(format!("{}/api/rooms/{}/messages", base, ROOM))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
#[serial]
async fn test_health_and_error_mapping() {
    let homeserver = mock_homeserver().await;
    let (addr, _state) = spawn_gateway(&homeserver.url()).await;
    let http = reqwest::Client::new();
    let base = format!("http://{}", addr);

    let health: Value = http
        .get(format!("{}/api/health", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["sessions"], 0);

    // No chat token configured
    let response = http
        .post(format!("{}/api/sessions/s1/attach", base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], 401);

    let response = http
        .post(format!("{}/api/sessions/s1/messages", base))
        .json(&json!({"text": "   "}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    let response = http
        .post(format!("{}/api/sessions/s1/messages", base))
        .json(&json!({"text": "hello"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    let response = http
        .get(format!("{}/ws/rooms/unknown", base))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_client_error());
}
