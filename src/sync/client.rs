//! Protocol HTTP client
//!
//! REST history fetch and long-poll `/sync` against a Matrix-style client API.
//! The [`SyncTransport`] trait is the seam the poller depends on, so tests can
//! substitute a scripted transport.

use crate::sync::error::SyncError;
use crate::sync::types::{room_filter, MessagesResponse, RoomEvent, SyncRequest, SyncResponse};
use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Default timeline limit used in the room-scoped sync filter
pub const DEFAULT_TIMELINE_LIMIT: u32 = 50;

/// Extra client-side allowance on top of the server wait timeout
const LONG_POLL_GRACE: Duration = Duration::from_secs(10);

/// Transport used by the sync poller
#[async_trait]
pub trait SyncTransport: Send + Sync {
    /// Fetch one backward page of past events, newest first
    async fn fetch_history(&self, room_id: &str, limit: u32) -> Result<Vec<RoomEvent>, SyncError>;

    /// Issue one long-poll request
    async fn sync(&self, request: SyncRequest) -> Result<SyncResponse, SyncError>;
}

/// `reqwest`-backed transport with bearer authentication
#[derive(Debug, Clone)]
pub struct HttpSyncClient {
    client: reqwest::Client,
    base_url: Url,
    access_token: String,
    timeline_limit: u32,
}

impl HttpSyncClient {
    /// Create a client for the given client-API root
    ///
    /// # Arguments
    /// * `client` - Shared HTTP client (connection pooling)
    /// * `base_url` - Client API root, e.g. `https://hs/_matrix/client/v3`
    /// * `access_token` - Bearer token; `None` or empty fails fast
    ///
    /// # Errors
    /// * `SyncError::MissingCredential` if no token is available
    /// * `SyncError::InvalidUrl` if `base_url` cannot be parsed
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        access_token: Option<&str>,
    ) -> Result<Self, SyncError> {
        let access_token = access_token
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| SyncError::MissingCredential("protocol access token".to_string()))?;
        let base_url =
            Url::parse(base_url).map_err(|e| SyncError::InvalidUrl(format!("{}: {}", base_url, e)))?;

        Ok(Self {
            client,
            base_url,
            access_token: access_token.to_string(),
            timeline_limit: DEFAULT_TIMELINE_LIMIT,
        })
    }

    /// Set the timeline limit used in the sync filter
    pub fn with_timeline_limit(mut self, limit: u32) -> Self {
        self.timeline_limit = limit;
        self
    }

    /// URL of the history endpoint for a room
    pub fn history_url(&self, room_id: &str, limit: u32) -> Result<Url, SyncError> {
        let mut url = self.endpoint(&["rooms", room_id, "messages"])?;
        url.query_pairs_mut()
            .append_pair("dir", "b")
            .append_pair("limit", &limit.to_string());
        Ok(url)
    }

    /// URL of one long-poll sync request
    pub fn sync_url(&self, request: &SyncRequest) -> Result<Url, SyncError> {
        let mut url = self.endpoint(&["sync"])?;
        let filter = room_filter(&request.room_id, self.timeline_limit).to_string();
        {
            let mut query = url.query_pairs_mut();
            if let Some(since) = &request.since {
                query.append_pair("since", since);
            }
            query
                .append_pair("timeout", &request.timeout_ms.to_string())
                .append_pair("filter", &filter);
        }
        Ok(url)
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, SyncError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| SyncError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

#[async_trait]
impl SyncTransport for HttpSyncClient {
    async fn fetch_history(&self, room_id: &str, limit: u32) -> Result<Vec<RoomEvent>, SyncError> {
        let url = self.history_url(room_id, limit)?;
        tracing::debug!(room_id = %room_id, limit = limit, "Fetching room history");

        let response = self
            .client
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        let page: MessagesResponse = read_json(response).await?;

        tracing::debug!(
            room_id = %room_id,
            event_count = page.chunk.len(),
            "Received room history page"
        );
        Ok(page.chunk)
    }

    async fn sync(&self, request: SyncRequest) -> Result<SyncResponse, SyncError> {
        let url = self.sync_url(&request)?;
        tracing::debug!(
            room_id = %request.room_id,
            since = ?request.since,
            timeout_ms = request.timeout_ms,
            "Issuing long-poll sync"
        );

        let response = self
            .client
            .get(url)
            .bearer_auth(&self.access_token)
            .timeout(Duration::from_millis(request.timeout_ms) + LONG_POLL_GRACE)
            .send()
            .await?;
        read_json(response).await
    }
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, SyncError> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read error body".to_string());

        tracing::error!(
            status_code = status.as_u16(),
            error_body = %body,
            "Protocol server returned error status"
        );

        return Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => SyncError::Unauthorized {
                status: status.as_u16(),
                body,
            },
            _ => SyncError::Status {
                status: status.as_u16(),
                body,
            },
        });
    }

    let body = response.text().await?;
    serde_json::from_str(&body)
        .map_err(|e| SyncError::Decode(format!("{} - Response body: {}", e, body)))
}
