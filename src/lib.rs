//! Care Sync
//!
//! Keeps conversation transcripts in step with two kinds of backend: an
//! application chat service reached over a per-session WebSocket, and a
//! Matrix-style homeserver reached through REST history and long-poll sync.
//! Both feed a shared message model; room transcripts are deduplicated and
//! ordered by the merge engine in [`transcript`].
//!
//! The binary in `src/main.rs` exposes everything through a small HTTP and
//! WebSocket gateway.

pub mod api;
pub mod chat;
pub mod config;
pub mod error;
pub mod message;
/// Gateway application state
pub mod state;
pub mod sync;
pub mod transcript;
pub mod websocket;
