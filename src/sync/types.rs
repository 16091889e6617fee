//! Protocol wire types
//!
//! Request and response shapes for the room history and long-poll sync
//! endpoints. Fields are defaulted generously so that a partially populated
//! event never fails a whole batch.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// A single room timeline event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoomEvent {
    /// Server-assigned event id
    #[serde(default)]
    pub event_id: String,
    /// Event type, e.g. `m.room.message`
    #[serde(rename = "type", default)]
    pub event_type: String,
    /// Sender identity
    #[serde(default)]
    pub sender: String,
    /// Origin server timestamp in epoch milliseconds
    #[serde(default)]
    pub origin_server_ts: Option<i64>,
    /// Event content; carries `msgtype` for room messages
    #[serde(default)]
    pub content: Value,
}

/// Response of `GET /rooms/{roomId}/messages`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessagesResponse {
    /// Events, newest first when fetched with `dir=b`
    #[serde(default)]
    pub chunk: Vec<RoomEvent>,
    /// Pagination token the page starts at
    #[serde(default)]
    pub start: Option<String>,
    /// Pagination token for the next (older) page
    #[serde(default)]
    pub end: Option<String>,
}

/// Response of `GET /sync`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncResponse {
    /// Cursor to send as `since` on the next request
    pub next_batch: String,
    /// Per-room updates
    #[serde(default)]
    pub rooms: SyncRooms,
}

/// Rooms section of a sync response
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncRooms {
    /// Joined rooms keyed by room id
    #[serde(default)]
    pub join: HashMap<String, JoinedRoom>,
}

/// Update for one joined room
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JoinedRoom {
    /// New timeline events
    #[serde(default)]
    pub timeline: Timeline,
}

/// Timeline slice of a joined room update
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Timeline {
    /// Events in chronological order
    #[serde(default)]
    pub events: Vec<RoomEvent>,
    /// Whether the server truncated the slice
    #[serde(default)]
    pub limited: bool,
}

impl SyncResponse {
    /// Timeline events delivered for `room_id`, if any
    pub fn room_events(&self, room_id: &str) -> &[RoomEvent] {
        self.rooms
            .join
            .get(room_id)
            .map(|room| room.timeline.events.as_slice())
            .unwrap_or(&[])
    }
}

/// One long-poll request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRequest {
    /// Room the request is scoped to
    pub room_id: String,
    /// Cursor from the previous response; `None` on the very first call
    pub since: Option<String>,
    /// Server-side wait timeout in milliseconds
    pub timeout_ms: u64,
}

/// Room-scoped filter sent with every sync request
pub fn room_filter(room_id: &str, timeline_limit: u32) -> Value {
    serde_json::json!({
        "room": {
            "rooms": [room_id],
            "timeline": { "limit": timeline_limit },
        },
        "presence": { "not_types": ["*"] },
        "account_data": { "not_types": ["*"] },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_response_room_events() {
        let body = r#"{
            "next_batch": "s2",
            "rooms": {"join": {"!r:hs": {"timeline": {"events": [
                {"event_id": "$a", "type": "m.room.message", "sender": "@u:hs",
                 "origin_server_ts": 5, "content": {"msgtype": "m.text", "body": "hi"}}
            ]}}}}
        }"#;
        let response: SyncResponse = serde_json::from_str(body).unwrap();

        assert_eq!(response.next_batch, "s2");
        assert_eq!(response.room_events("!r:hs").len(), 1);
        assert_eq!(response.room_events("!r:hs")[0].event_id, "$a");
        assert!(response.room_events("!other:hs").is_empty());
    }

    #[test]
    fn test_sync_response_without_rooms() {
        let response: SyncResponse = serde_json::from_str(r#"{"next_batch": "s9"}"#).unwrap();
        assert!(response.room_events("!r:hs").is_empty());
    }

    #[test]
    fn test_partial_event_is_tolerated() {
        let response: MessagesResponse =
            serde_json::from_str(r#"{"chunk": [{"type": "m.room.member"}]}"#).unwrap();
        assert_eq!(response.chunk.len(), 1);
        assert!(response.chunk[0].event_id.is_empty());
        assert!(response.chunk[0].origin_server_ts.is_none());
    }

    #[test]
    fn test_room_filter_is_scoped() {
        let filter = room_filter("!r:hs", 50);
        assert_eq!(filter["room"]["rooms"][0], "!r:hs");
        assert_eq!(filter["room"]["timeline"]["limit"], 50);
    }
}
