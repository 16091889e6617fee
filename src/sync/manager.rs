//! Room sync manager
//!
//! Registry of running [`SyncPoller`]s keyed by room id. One poller per room;
//! pollers are created on first attach and live until detached.

use super::client::SyncTransport;
use super::error::SyncError;
use super::poller::{SyncPoller, SyncSettings};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Manages room pollers
pub struct RoomSyncManager {
    /// Map from room_id to its poller
    pollers: Arc<RwLock<HashMap<String, Arc<SyncPoller>>>>,
    /// Transport shared by all pollers; `None` when no credential is configured
    transport: Option<Arc<dyn SyncTransport>>,
    /// Settings applied to new pollers
    settings: SyncSettings,
}

impl RoomSyncManager {
    /// Create a manager
    ///
    /// # Arguments
    /// * `transport` - Protocol transport, or `None` if no access token exists
    /// * `settings` - Tunables for every poller started by this manager
    pub fn new(transport: Option<Arc<dyn SyncTransport>>, settings: SyncSettings) -> Self {
        Self {
            pollers: Arc::new(RwLock::new(HashMap::new())),
            transport,
            settings,
        }
    }

    /// Get the running poller for a room, starting one if needed
    ///
    /// A poller that has stopped on its own (e.g. rejected credential) is
    /// replaced by a fresh one.
    ///
    /// # Errors
    /// * `SyncError::MissingCredential` if no transport is configured
    pub async fn attach(&self, room_id: &str) -> Result<Arc<SyncPoller>, SyncError> {
        let transport = self.transport.clone().ok_or_else(|| {
            warn!(room_id = %room_id, "Cannot attach room: no protocol access token");
            SyncError::MissingCredential("protocol access token".to_string())
        })?;

        let mut pollers = self.pollers.write().await;
        if let Some(existing) = pollers.get(room_id) {
            if existing.is_active() {
                debug!(room_id = %room_id, "Reusing running room poller");
                return Ok(existing.clone());
            }
            warn!(room_id = %room_id, "Existing room poller has stopped, replacing it");
        }

        let poller = Arc::new(SyncPoller::attach(
            room_id,
            transport,
            self.settings.clone(),
        ));
        if let Some(stale) = pollers.insert(room_id.to_string(), poller.clone()) {
            stale.detach().await;
        }

        info!(room_id = %room_id, "Room poller created and stored");
        Ok(poller)
    }

    /// Get the poller for a room, if one exists
    pub async fn get(&self, room_id: &str) -> Option<Arc<SyncPoller>> {
        self.pollers.read().await.get(room_id).cloned()
    }

    /// Stop and forget a room's poller
    ///
    /// Returns whether a poller existed.
    pub async fn detach(&self, room_id: &str) -> bool {
        let removed = self.pollers.write().await.remove(room_id);
        match removed {
            Some(poller) => {
                poller.detach().await;
                true
            }
            None => {
                debug!(room_id = %room_id, "No room poller to detach");
                false
            }
        }
    }

    /// Stop every poller (for graceful shutdown)
    pub async fn detach_all(&self) {
        info!("Detaching all room pollers");
        let drained: Vec<Arc<SyncPoller>> = {
            let mut pollers = self.pollers.write().await;
            pollers.drain().map(|(_, poller)| poller).collect()
        };
        for poller in drained {
            poller.detach().await;
        }
    }

    /// Number of registered rooms
    pub async fn room_count(&self) -> usize {
        self.pollers.read().await.len()
    }
}
