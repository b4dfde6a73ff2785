//! Heartbeat against the shardmanager: liveness, role discovery, and the
//! backup cold-start snapshot.

use super::StorageNode;
use tracing::{debug, info, warn};

impl StorageNode {
    /// One heartbeat: ping the manager, adopt the view it answers with, and
    /// pull a snapshot from the primary the first time this node finds
    /// itself in a non-primary role.
    pub async fn heartbeat_tick(&self) {
        let acked = self.inner.lock().acked_view;
        let resp = match self
            .transport
            .ping(&self.manager, &self.address, acked)
            .await
        {
            Ok(resp) => resp,
            Err(err) => {
                debug!(manager = %self.manager, error = %err, "shardmanager ping failed");
                return;
            }
        };

        let snapshot_from = {
            let mut state = self.inner.lock();
            state.primary = resp.primary.clone();
            state.backup = resp.backup.clone();
            state.acked_view = resp.id;
            if !resp.shardmaster.is_empty() {
                state.shardmaster = resp.shardmaster.clone();
            }

            if state.snapshot_loaded || state.shardmaster.is_empty() {
                None
            } else if state.primary == self.address {
                // We are the primary; there is nobody ahead of us to copy.
                state.snapshot_loaded = true;
                None
            } else if state.primary.is_empty() {
                // No primary published yet; try again next tick.
                None
            } else {
                state.snapshot_loaded = true;
                Some(state.primary.clone())
            }
        };

        if let Some(primary) = snapshot_from {
            match self.transport.dump(&primary).await {
                Ok(snapshot) => {
                    info!(from = %primary, entries = snapshot.len(), "cold-start snapshot merged");
                    let mut state = self.inner.lock();
                    for (key, value) in snapshot {
                        state.db.insert(key, value);
                    }
                }
                Err(err) => {
                    warn!(from = %primary, error = %err, "cold-start snapshot failed");
                    // Retry on a later heartbeat.
                    self.inner.lock().snapshot_loaded = false;
                }
            }
        }
    }
}
