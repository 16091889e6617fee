//! Application configuration
//!
//! Centralized configuration management with environment variable support
//! and sensible defaults.

use crate::chat::ChatEndpoint;
use crate::sync::SyncSettings;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Gateway server configuration
    pub server: ServerConfig,
    /// Chat backend configuration
    pub chat: ChatConfig,
    /// Protocol server configuration
    pub protocol: ProtocolConfig,
}

/// Gateway server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to bind the server to
    pub port: u16,
    /// Host address to bind to
    pub host: String,
}

/// Chat backend configuration
#[derive(Clone)]
pub struct ChatConfig {
    /// WebSocket base URL of the chat backend
    pub ws_url: String,
    /// Token appended to the session URL
    pub token: Option<String>,
}

/// Protocol server configuration
#[derive(Clone)]
pub struct ProtocolConfig {
    /// Client API root of the protocol server
    pub api_url: String,
    /// Bearer access token
    pub access_token: Option<String>,
    /// Poller tunables
    pub sync: SyncSettings,
}

impl std::fmt::Debug for ChatConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatConfig")
            .field("ws_url", &self.ws_url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl std::fmt::Debug for ProtocolConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolConfig")
            .field("api_url", &self.api_url)
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("sync", &self.sync)
            .finish()
    }
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        let defaults = SyncSettings::default();
        Self {
            server: ServerConfig {
                port: parse_var("PORT", 8080),
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            },
            chat: ChatConfig {
                ws_url: env::var("CHAT_WS_URL").unwrap_or_else(|_| "ws://localhost:8000".to_string()),
                token: non_empty_var("CHAT_TOKEN"),
            },
            protocol: ProtocolConfig {
                api_url: env::var("MATRIX_API_URL")
                    .unwrap_or_else(|_| "http://localhost:8008/_matrix/client/v3".to_string()),
                access_token: non_empty_var("MATRIX_ACCESS_TOKEN"),
                sync: SyncSettings {
                    history_limit: parse_var("HISTORY_PAGE_LIMIT", defaults.history_limit),
                    long_poll_timeout_ms: parse_var(
                        "SYNC_TIMEOUT_MS",
                        defaults.long_poll_timeout_ms,
                    ),
                    retry_delay: Duration::from_millis(parse_var(
                        "SYNC_RETRY_DELAY_MS",
                        defaults.retry_delay.as_millis() as u64,
                    )),
                },
            },
        }
    }

    /// Get the server address as a string
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Chat endpoint built from this configuration
    pub fn chat_endpoint(&self) -> ChatEndpoint {
        ChatEndpoint::new(self.chat.ws_url.clone(), self.chat.token.clone())
    }
}

fn parse_var<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}
