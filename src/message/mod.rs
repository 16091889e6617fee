//! Message module
//!
//! The canonical message record and the normalizer that maps both wire
//! formats onto it.

pub mod models;
pub mod normalizer;

pub use models::{IngestContext, Message, MessageContent, MessageId, MessageRole, MessageStatus};
pub use normalizer::{
    normalize_chat_envelope, normalize_protocol_event, parse_chat_frame, parse_timestamp,
    ChatFrame,
};
