//! Envelope normalizer
//!
//! Pure functions converting raw wire payloads, either chat-socket JSON or
//! protocol room events, into the canonical [`Message`]. Nothing in this module
//! performs I/O, reads the clock, or generates identifiers; callers pass those
//! in through [`IngestContext`].

use crate::message::models::{IngestContext, Message, MessageContent, MessageRole, MessageStatus};
use crate::sync::types::RoomEvent;
use chrono::{DateTime, NaiveDateTime};
use serde_json::Value;

/// Envelope tag marking the one-shot history replay on the chat socket
pub const HISTORY_ENVELOPE_TYPE: &str = "history";

const MSGTYPE_TEXT: &str = "m.text";
const MSGTYPE_NOTICE: &str = "m.notice";
const MSGTYPE_EMOTE: &str = "m.emote";
const MSGTYPE_IMAGE: &str = "m.image";
const MSGTYPE_FILE: &str = "m.file";

/// A decoded chat-socket frame
#[derive(Debug, Clone, PartialEq)]
pub enum ChatFrame {
    /// `{ "type": "history", "messages": [...] }`
    History(Vec<Value>),
    /// Any other payload, representing a single message
    Single(Value),
}

/// Decode a text frame received on the chat socket
///
/// Frames that are not valid JSON are kept as a bare string.
pub fn parse_chat_frame(text: &str) -> ChatFrame {
    let value = serde_json::from_str::<Value>(text).unwrap_or_else(|_| Value::String(text.to_string()));

    if is_history_envelope(&value) {
        let messages = match value.get("messages") {
            Some(Value::Array(items)) => items.clone(),
            _ => Vec::new(),
        };
        return ChatFrame::History(messages);
    }

    ChatFrame::Single(value)
}

/// Normalize one chat-socket payload
///
/// Text is extracted by precedence: a `content` field (verbatim string, else
/// `content.message`, else its JSON form), then `parts[0].text`, then a bare
/// string, then the JSON form of whatever was received. A string payload that
/// is itself JSON is decoded first.
///
/// Returns `None` only for a history envelope, which carries many messages and
/// is handled through [`parse_chat_frame`].
pub fn normalize_chat_envelope(raw: &Value, ctx: &IngestContext) -> Option<Message> {
    let decoded;
    let value = match raw {
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(parsed) => {
                decoded = parsed;
                &decoded
            }
            Err(_) => raw,
        },
        other => other,
    };

    if is_history_envelope(value) {
        return None;
    }

    let role = value
        .get("role")
        .and_then(Value::as_str)
        .and_then(MessageRole::from_chat_tag)
        .unwrap_or(MessageRole::Assistant);
    let status = value
        .get("status")
        .and_then(Value::as_str)
        .and_then(MessageStatus::from_tag)
        .unwrap_or(MessageStatus::Sent);
    let timestamp = value
        .get("timestamp")
        .and_then(parse_timestamp)
        .unwrap_or(ctx.received_at);

    Some(Message {
        id: ctx.fallback_id.clone(),
        role,
        content: MessageContent::text(extract_chat_text(value)),
        timestamp,
        status: Some(status),
    })
}

/// Normalize one protocol room event
///
/// The event's `msgtype` selects exactly one content branch; unknown subtypes
/// and non-message events yield [`MessageContent::Empty`].
pub fn normalize_protocol_event(event: &RoomEvent, ctx: &IngestContext) -> Message {
    let id = if event.event_id.is_empty() {
        ctx.fallback_id.clone()
    } else {
        event.event_id.clone()
    };

    Message {
        id,
        role: MessageRole::Sender(event.sender.clone()),
        content: protocol_content(&event.content),
        timestamp: event.origin_server_ts.unwrap_or(ctx.received_at),
        status: None,
    }
}

/// Parse a wire timestamp into epoch milliseconds
///
/// Accepts epoch milliseconds (number or numeric string), RFC 3339, and naive
/// ISO-8601 date-times, which are read as UTC.
pub fn parse_timestamp(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(millis) = s.parse::<i64>() {
                return Some(millis);
            }
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.timestamp_millis());
            }
            ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(|naive| naive.and_utc().timestamp_millis())
        }
        _ => None,
    }
}

fn is_history_envelope(value: &Value) -> bool {
    value.get("type").and_then(Value::as_str) == Some(HISTORY_ENVELOPE_TYPE)
}

fn extract_chat_text(value: &Value) -> String {
    if let Some(content) = value.get("content").filter(|c| !c.is_null()) {
        return match content {
            Value::String(s) => s.clone(),
            Value::Object(map) => match map.get("message") {
                Some(Value::String(s)) => s.clone(),
                Some(message) if !message.is_null() => to_display(message),
                _ => to_display(content),
            },
            other => to_display(other),
        };
    }

    if let Some(text) = value.pointer("/parts/0/text").and_then(Value::as_str) {
        return text.to_string();
    }

    match value {
        Value::String(s) => s.clone(),
        other => to_display(other),
    }
}

fn to_display(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

fn protocol_content(content: &Value) -> MessageContent {
    let field = |name: &str| content.get(name).and_then(Value::as_str);

    match field("msgtype") {
        Some(MSGTYPE_TEXT | MSGTYPE_NOTICE | MSGTYPE_EMOTE) => match field("body") {
            Some(body) => MessageContent::text(body),
            None => MessageContent::Empty,
        },
        Some(MSGTYPE_IMAGE) => match field("url") {
            Some(url) => MessageContent::Image {
                url: url.to_string(),
            },
            None => MessageContent::Empty,
        },
        Some(MSGTYPE_FILE) => match field("url") {
            Some(url) => MessageContent::File {
                name: field("filename")
                    .or_else(|| field("body"))
                    .unwrap_or("file")
                    .to_string(),
                url: url.to_string(),
            },
            None => MessageContent::Empty,
        },
        _ => MessageContent::Empty,
    }
}
