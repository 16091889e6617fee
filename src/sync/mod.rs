//! Protocol sync module
//!
//! History fetch plus long-poll synchronization of protocol rooms into
//! deduplicated, time-ordered transcripts.

pub mod client;
pub mod error;
pub mod manager;
pub mod poller;
pub mod types;

pub use client::{HttpSyncClient, SyncTransport};
pub use error::SyncError;
pub use manager::RoomSyncManager;
pub use poller::{SyncPoller, SyncSettings, SyncSnapshot};
pub use types::{RoomEvent, SyncRequest, SyncResponse};
