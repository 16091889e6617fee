//! Chat-socket error types

use thiserror::Error;

/// Errors that can occur while attaching a chat session
#[derive(Error, Debug)]
pub enum ChatError {
    /// No chat token is available
    #[error("Missing credential: {0}")]
    MissingCredential(String),

    /// The session endpoint URL could not be built
    #[error("Invalid chat endpoint: {0}")]
    InvalidEndpoint(String),

    /// WebSocket handshake or transport failure
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}
