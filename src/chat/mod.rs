//! Chat module
//!
//! WebSocket sessions with the application chat backend.

pub mod error;
pub mod manager;
pub mod session;

pub use error::ChatError;
pub use manager::ChatSessionManager;
pub use session::{ChatEndpoint, ChatSession, ChatSnapshot, ConnectionState};
