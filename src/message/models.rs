//! Canonical message model
//!
//! Defines the transport-agnostic `Message` record that both the chat socket
//! and the protocol sync stream are normalized into.

use serde::{Deserialize, Serialize};

/// Unique identifier of a message within one transcript
pub type MessageId = String;

/// Who produced a message
///
/// Chat-socket messages carry one of the fixed roles; protocol events carry
/// the sender identity reported by the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Message typed by the local user
    User,
    /// Message produced by the assistant
    Assistant,
    /// System notice
    System,
    /// Sender identity of a protocol event (e.g. `@alice:example.org`)
    Sender(String),
}

impl MessageRole {
    /// Parse a chat-socket role tag; unknown tags yield `None`
    pub fn from_chat_tag(tag: &str) -> Option<Self> {
        match tag {
            "user" => Some(MessageRole::User),
            "assistant" => Some(MessageRole::Assistant),
            "system" => Some(MessageRole::System),
            _ => None,
        }
    }
}

/// Delivery status of a chat-socket message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// Handed to the socket, not yet confirmed
    Sending,
    /// Delivered
    Sent,
    /// Still being streamed by the assistant
    Streaming,
    /// Delivery failed
    Error,
}

impl MessageStatus {
    /// Parse a status tag; unknown tags yield `None`
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "sending" => Some(MessageStatus::Sending),
            "sent" => Some(MessageStatus::Sent),
            "streaming" => Some(MessageStatus::Streaming),
            "error" => Some(MessageStatus::Error),
            _ => None,
        }
    }
}

/// Message payload
///
/// Exactly one branch is populated per message. `Empty` is produced for
/// protocol events whose subtype is not understood; such entries stay in the
/// transcript for deduplication but are hidden from display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageContent {
    /// Plain text
    Text {
        /// Text body
        text: String,
    },
    /// Image reference
    Image {
        /// Image location (content URI or URL)
        url: String,
    },
    /// File reference
    File {
        /// Display name of the file
        name: String,
        /// File location (content URI or URL)
        url: String,
    },
    /// No branch populated
    Empty,
}

impl MessageContent {
    /// Build a text branch
    pub fn text(text: impl Into<String>) -> Self {
        MessageContent::Text { text: text.into() }
    }

    /// Whether any branch is populated
    pub fn is_populated(&self) -> bool {
        !matches!(self, MessageContent::Empty)
    }

    /// Text body, if this is the text branch
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MessageContent::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// A single normalized message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Stable identifier (event id, or a client-generated id for chat messages)
    pub id: MessageId,
    /// Author of the message
    pub role: MessageRole,
    /// Payload
    pub content: MessageContent,
    /// Epoch milliseconds, used only for ordering
    pub timestamp: i64,
    /// Delivery status; `None` for protocol events (implicitly sent)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<MessageStatus>,
}

impl Message {
    /// Whether the message has something to display
    pub fn is_displayable(&self) -> bool {
        self.content.is_populated()
    }
}

/// Values the caller supplies so that normalization stays pure
///
/// The normalizer never invents identifiers or reads the clock; when a wire
/// payload has no id or timestamp of its own these are used instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestContext {
    /// Identifier to use when the payload carries none
    pub fallback_id: MessageId,
    /// Client receipt time in epoch milliseconds
    pub received_at: i64,
}

impl IngestContext {
    /// Create a context from explicit values
    pub fn new(fallback_id: impl Into<MessageId>, received_at: i64) -> Self {
        Self {
            fallback_id: fallback_id.into(),
            received_at,
        }
    }

    /// Create a context with a fresh UUID and the current wall-clock time
    pub fn now() -> Self {
        Self {
            fallback_id: uuid::Uuid::new_v4().to_string(),
            received_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}
