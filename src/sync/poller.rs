//! Room sync poller
//!
//! Keeps one room's transcript current. A one-shot history fetch and an
//! unbounded long-poll loop feed the same [`Transcript`]; the loop advances an
//! opaque cursor, retries failures after a fixed delay, and stops promptly when
//! the poller is detached.
//!
//! The transcript is owned by the worker task alone. Readers observe it through
//! a `watch` channel carrying [`SyncSnapshot`]s.

use crate::message::{normalize_protocol_event, IngestContext, Message};
use crate::sync::client::SyncTransport;
use crate::sync::error::SyncError;
use crate::sync::types::{RoomEvent, SyncRequest, SyncResponse};
use crate::transcript::Transcript;
use futures_util::future::BoxFuture;
use serde::Serialize;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Default history page size
pub const DEFAULT_HISTORY_LIMIT: u32 = 50;
/// Default server-side long-poll wait
pub const DEFAULT_LONG_POLL_TIMEOUT_MS: u64 = 30_000;
/// Default fixed delay before retrying a failed poll
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(3);

/// Poller tunables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    /// Page size of the one-shot history fetch
    pub history_limit: u32,
    /// Server-side wait timeout sent with each long-poll request
    pub long_poll_timeout_ms: u64,
    /// Fixed delay between a failed poll and the next attempt
    pub retry_delay: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            history_limit: DEFAULT_HISTORY_LIMIT,
            long_poll_timeout_ms: DEFAULT_LONG_POLL_TIMEOUT_MS,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// Observable state of one room's sync
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncSnapshot {
    /// Room being synchronized
    pub room_id: String,
    /// Full transcript in display order, including entries without content
    pub messages: Vec<Message>,
    /// Current cursor; `None` until the first successful poll
    pub next_batch: Option<String>,
    /// Most recent failure, cleared by the next successful poll
    pub last_error: Option<String>,
    /// Whether the one-shot history page has been merged
    pub history_loaded: bool,
    /// False once the poller has stopped
    pub active: bool,
}

impl SyncSnapshot {
    /// Messages with at least one populated content branch
    pub fn visible_messages(&self) -> Vec<Message> {
        self.messages
            .iter()
            .filter(|m| m.is_displayable())
            .cloned()
            .collect()
    }
}

/// Handle to a running room sync
///
/// Dropping the handle cancels the worker; [`SyncPoller::detach`] additionally
/// waits for it to finish.
pub struct SyncPoller {
    room_id: String,
    snapshot: watch::Receiver<SyncSnapshot>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SyncPoller {
    /// Start syncing a room
    ///
    /// Spawns the worker task, which immediately issues the history fetch and
    /// the first long-poll request. Must be called within a Tokio runtime.
    pub fn attach(
        room_id: impl Into<String>,
        transport: Arc<dyn SyncTransport>,
        settings: SyncSettings,
    ) -> Self {
        let room_id = room_id.into();
        let (snapshot_tx, snapshot_rx) = watch::channel(SyncSnapshot {
            room_id: room_id.clone(),
            active: true,
            ..SyncSnapshot::default()
        });
        let cancel = CancellationToken::new();

        let worker = PollWorker {
            room_id: room_id.clone(),
            transport,
            settings,
            transcript: Transcript::new(),
            cursor: None,
            last_error: None,
            history_loaded: false,
            snapshot: snapshot_tx,
            cancel: cancel.child_token(),
        };

        info!(room_id = %room_id, "Attaching room sync poller");
        let task = tokio::spawn(worker.run());

        Self {
            room_id,
            snapshot: snapshot_rx,
            cancel,
            task: Mutex::new(Some(task)),
        }
    }

    /// Room this poller synchronizes
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Current state
    pub fn snapshot(&self) -> SyncSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Receiver notified on every state change
    pub fn subscribe(&self) -> watch::Receiver<SyncSnapshot> {
        self.snapshot.clone()
    }

    /// Whether the poller is still running
    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled() && self.snapshot.borrow().active
    }

    /// Stop syncing
    ///
    /// Cancels the in-flight request (its future is dropped, aborting the HTTP
    /// call) and waits for the worker to exit. Safe to call more than once.
    pub async fn detach(&self) {
        self.cancel.cancel();

        let task = self.task.lock().await.take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(room_id = %self.room_id, error = %e, "Sync worker ended abnormally");
            }
            info!(room_id = %self.room_id, "Room sync poller detached");
        }
    }
}

impl Drop for SyncPoller {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// What the live loop is currently waiting on
enum Phase<'a> {
    /// A long-poll request is outstanding
    Polling(BoxFuture<'a, Result<SyncResponse, SyncError>>),
    /// Waiting out the retry delay after a failure
    Backoff(Pin<Box<Sleep>>),
}

enum PhaseOutcome {
    Response(Result<SyncResponse, SyncError>),
    BackoffElapsed,
}

impl Phase<'_> {
    async fn advance(&mut self) -> PhaseOutcome {
        match self {
            Phase::Polling(request) => PhaseOutcome::Response(request.await),
            Phase::Backoff(sleep) => {
                sleep.await;
                PhaseOutcome::BackoffElapsed
            }
        }
    }
}

struct PollWorker {
    room_id: String,
    transport: Arc<dyn SyncTransport>,
    settings: SyncSettings,
    transcript: Transcript,
    cursor: Option<String>,
    last_error: Option<String>,
    history_loaded: bool,
    snapshot: watch::Sender<SyncSnapshot>,
    cancel: CancellationToken,
}

impl PollWorker {
    async fn run(mut self) {
        let room_id = self.room_id.clone();
        let transport = Arc::clone(&self.transport);

        let mut history = Some(transport.fetch_history(&room_id, self.settings.history_limit));
        let mut phase = Phase::Polling(transport.sync(self.next_request()));

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                result = async {
                    match history.as_mut() {
                        Some(fetch) => fetch.await,
                        None => std::future::pending().await,
                    }
                }, if history.is_some() => {
                    history = None;
                    self.apply_history(result);
                }
                outcome = phase.advance() => {
                    if self.cancel.is_cancelled() {
                        debug!(room_id = %room_id, "Discarding result that resolved after detach");
                        break;
                    }

                    phase = match outcome {
                        PhaseOutcome::Response(Ok(response)) => {
                            self.apply_sync(response);
                            Phase::Polling(transport.sync(self.next_request()))
                        }
                        PhaseOutcome::Response(Err(err)) => {
                            self.record_error(&err);
                            if err.is_fatal() {
                                error!(
                                    room_id = %room_id,
                                    error = %err,
                                    "Sync stopped: no usable credential"
                                );
                                break;
                            }
                            warn!(
                                room_id = %room_id,
                                error = %err,
                                retry_in_ms = self.settings.retry_delay.as_millis() as u64,
                                "Sync request failed, retry scheduled"
                            );
                            Phase::Backoff(Box::pin(tokio::time::sleep(self.settings.retry_delay)))
                        }
                        PhaseOutcome::BackoffElapsed => {
                            Phase::Polling(transport.sync(self.next_request()))
                        }
                    };
                }
            }
        }

        // Abort anything still in flight before reporting the stop.
        drop(phase);
        drop(history);

        self.snapshot.send_modify(|s| s.active = false);
        info!(room_id = %room_id, "Room sync poller stopped");
    }

    fn next_request(&self) -> SyncRequest {
        SyncRequest {
            room_id: self.room_id.clone(),
            since: self.cursor.clone(),
            timeout_ms: self.settings.long_poll_timeout_ms,
        }
    }

    fn apply_history(&mut self, result: Result<Vec<RoomEvent>, SyncError>) {
        match result {
            Ok(events) => {
                // Pages arrive newest first; merge oldest first so ties stay chronological.
                let batch = self.normalize_events(events.iter().rev());
                let inserted = self.transcript.merge(batch);
                self.history_loaded = true;

                info!(
                    room_id = %self.room_id,
                    fetched = events.len(),
                    inserted = inserted,
                    "Merged room history"
                );
                self.publish();
            }
            Err(err) => {
                warn!(room_id = %self.room_id, error = %err, "History fetch failed");
                self.record_error(&err);
            }
        }
    }

    fn apply_sync(&mut self, response: SyncResponse) {
        let batch = self.normalize_events(response.room_events(&self.room_id).iter());
        let delivered = batch.len();
        let inserted = self.transcript.merge(batch);

        self.cursor = Some(response.next_batch);
        self.last_error = None;

        debug!(
            room_id = %self.room_id,
            delivered = delivered,
            inserted = inserted,
            next_batch = ?self.cursor,
            "Applied sync response"
        );
        self.publish();
    }

    // Events without an id cannot be deduplicated, so they never enter the transcript.
    fn normalize_events<'e>(&self, events: impl Iterator<Item = &'e RoomEvent>) -> Vec<Message> {
        events
            .filter(|event| {
                if event.event_id.is_empty() {
                    debug!(
                        room_id = %self.room_id,
                        event_type = %event.event_type,
                        "Skipping room event without an id"
                    );
                    return false;
                }
                true
            })
            .map(|event| normalize_protocol_event(event, &IngestContext::now()))
            .collect()
    }

    fn record_error(&mut self, err: &SyncError) {
        self.last_error = Some(err.to_string());
        self.publish();
    }

    fn publish(&self) {
        self.snapshot.send_replace(SyncSnapshot {
            room_id: self.room_id.clone(),
            messages: self.transcript.snapshot(),
            next_batch: self.cursor.clone(),
            last_error: self.last_error.clone(),
            history_loaded: self.history_loaded,
            active: true,
        });
    }
}
