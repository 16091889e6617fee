//! Sync-specific error types
//!
//! Errors raised by the protocol transport (history fetch and long-poll sync).

use thiserror::Error;

/// Errors that can occur while talking to the protocol server
#[derive(Error, Debug)]
pub enum SyncError {
    /// No access token is available
    #[error("Missing credential: {0}")]
    MissingCredential(String),

    /// The server rejected the access token
    #[error("Unauthorized (HTTP {status}): {body}")]
    Unauthorized {
        /// HTTP status code (401 or 403)
        status: u16,
        /// Response body
        body: String,
    },

    /// Request could not be sent or the connection failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-success status
    #[error("Server returned error status {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body
        body: String,
    },

    /// Response body could not be decoded
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// Endpoint URL could not be built
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl SyncError {
    /// Whether retrying cannot help
    ///
    /// Only a missing credential fails fast; a token the server rejects is
    /// retried by the poller like any other failure.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SyncError::MissingCredential(_))
    }
}
