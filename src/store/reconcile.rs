//! Reconcile against the shardmaster: refresh shard ownership and hand
//! lost keys to their new owner.

use std::collections::HashMap;

use tracing::{info, warn};

use super::StorageNode;
use crate::error::StoreResult;
use crate::keys::{extract_id, is_user_key, roster_remove, ALL_USERS_KEY};

impl StorageNode {
    /// One reconcile pass.
    ///
    /// Queries the shardmaster, then pushes every held key this node is no
    /// longer responsible for to the new owner with a Put before deleting it
    /// locally. A key whose transfer exhausts the retry budget stays put;
    /// the next pass picks it up again.
    pub async fn reconcile_tick(&self) -> StoreResult<()> {
        let master = {
            let state = self.inner.lock();
            if state.shardmaster.is_empty() {
                return Ok(());
            }
            state.shardmaster.clone()
        };

        let config = self.transport.query(&master).await?;
        let mut next_owners: HashMap<u64, String> = HashMap::new();
        for entry in &config {
            for shard in &entry.shards {
                for id in shard.lower..=shard.upper {
                    next_owners.insert(id, entry.server.clone());
                }
            }
        }

        // Every stored record key must be one we are still responsible for.
        // Scanning held keys (rather than diffing ownership maps) also
        // re-queues keys whose transfer failed on an earlier pass.
        let transfers = {
            let state = self.inner.lock();
            let mut transfers = Vec::new();
            for (key, value) in &state.db {
                if key.as_str() == ALL_USERS_KEY {
                    continue;
                }
                let id = extract_id(key);
                let Some(next) = next_owners.get(&id) else {
                    continue;
                };
                if next != &self.manager {
                    transfers.push((key.clone(), value.clone(), next.clone()));
                }
            }
            transfers
        };

        for (key, value, target) in transfers {
            match self.put_with_retry(&target, &key, &value).await {
                Ok(()) => {
                    let mut state = self.inner.lock();
                    state.db.remove(&key);
                    if is_user_key(&key) {
                        if let Some(roster) = state.db.get(ALL_USERS_KEY) {
                            let updated = roster_remove(roster, &key);
                            state.db.insert(ALL_USERS_KEY.to_string(), updated);
                        }
                    }
                    info!(key = %key, target = %target, "key handed off to new owner");
                }
                Err(err) => {
                    // Not silently dropped: the key stays here and the next
                    // pass retries the transfer.
                    warn!(key = %key, target = %target, error = %err, "key hand-off exhausted its retry budget");
                }
            }
        }

        self.inner.lock().key_owner = next_owners;
        Ok(())
    }
}
