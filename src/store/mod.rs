//! Storage server: an in-memory shard-owning key-value node.
//!
//! Client operations arrive through the shardmanager, which only routes to
//! the primary. The primary replicates every Put to its backup before
//! applying it. Two background loops keep the node honest: a heartbeat loop
//! against the shardmanager (role discovery, cold-start snapshot) and a
//! reconcile loop against the shardmaster (shard ownership, key hand-off).

pub mod heartbeat;
pub mod reconcile;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::{interval, sleep};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::api::KvService;
use crate::config::NodeSettings;
use crate::error::{StoreError, StoreResult};
use crate::keys::{
    extract_id, is_list_key, is_post_key, post_list_key, roster_append, ALL_USERS_KEY,
};
use crate::protocol::PingResponse;
use crate::transport::Transport;

pub struct StorageNode {
    /// Address this node advertises in pings; other nodes reach it here.
    address: String,
    /// Shardmanager fronting this node's replication group. Ownership in
    /// the shardmaster's configuration is expressed in manager addresses.
    manager: String,
    settings: NodeSettings,
    transport: Arc<dyn Transport>,
    inner: Mutex<NodeState>,
}

#[derive(Default)]
struct NodeState {
    db: BTreeMap<String, String>,
    /// key-id -> owning manager address, from the latest shardmaster query.
    key_owner: HashMap<u64, String>,
    /// post key -> owning user key, for post-list bookkeeping.
    post_user: HashMap<String, String>,
    primary: String,
    backup: String,
    acked_view: u64,
    shardmaster: String,
    snapshot_loaded: bool,
}

impl StorageNode {
    pub fn new(
        address: String,
        manager: String,
        transport: Arc<dyn Transport>,
        settings: NodeSettings,
    ) -> Self {
        Self {
            address,
            manager,
            settings,
            transport,
            inner: Mutex::new(NodeState::default()),
        }
    }

    /// Primary of the view this node last heard about.
    pub fn known_primary(&self) -> String {
        self.inner.lock().primary.clone()
    }

    pub fn known_backup(&self) -> String {
        self.inner.lock().backup.clone()
    }

    pub fn acknowledged_view(&self) -> u64 {
        self.inner.lock().acked_view
    }

    /// Spawn the heartbeat and reconcile loops as owned background tasks.
    pub fn start(
        self: &Arc<Self>,
        shutdown: CancellationToken,
    ) -> Vec<tokio::task::JoinHandle<()>> {
        let mut handles = Vec::new();

        let node = self.clone();
        let token = shutdown.clone();
        handles.push(tokio::spawn(async move {
            let mut tick = interval(node.settings.heartbeat_interval);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tick.tick() => node.heartbeat_tick().await,
                }
            }
        }));

        let node = self.clone();
        let token = shutdown;
        handles.push(tokio::spawn(async move {
            let mut tick = interval(node.settings.reconcile_interval);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tick.tick() => {
                        if let Err(err) = node.reconcile_tick().await {
                            debug!(error = %err, "reconcile pass failed");
                        }
                    }
                }
            }
        }));

        handles
    }

    fn check_ownership(&self, key: &str) -> StoreResult<()> {
        let id = extract_id(key);
        let state = self.inner.lock();
        if state.key_owner.get(&id).map(String::as_str) == Some(self.manager.as_str()) {
            Ok(())
        } else {
            Err(StoreError::NotOwner)
        }
    }

    /// Append to a roster key on the server owning it, with bounded retries.
    async fn append_with_retry(&self, addr: &str, key: &str, data: &str) -> StoreResult<()> {
        for attempt in 1..=self.settings.max_server_attempts {
            match self.transport.append(addr, key, data).await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    debug!(addr, key, attempt, error = %err, "remote append failed");
                    if attempt < self.settings.max_server_attempts {
                        sleep(self.settings.retry_backoff).await;
                    }
                }
            }
        }
        Err(StoreError::PeerUnreachable(self.settings.max_server_attempts))
    }

    pub(crate) async fn put_with_retry(
        &self,
        addr: &str,
        key: &str,
        data: &str,
    ) -> StoreResult<()> {
        for attempt in 1..=self.settings.max_server_attempts {
            match self.transport.put(addr, key, data, "").await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    debug!(addr, key, attempt, error = %err, "remote put failed");
                    if attempt < self.settings.max_server_attempts {
                        sleep(self.settings.retry_backoff).await;
                    }
                }
            }
        }
        Err(StoreError::PeerUnreachable(self.settings.max_server_attempts))
    }
}

#[async_trait]
impl KvService for StorageNode {
    async fn get(&self, key: &str) -> StoreResult<String> {
        // No ownership check: reads arrive via the manager, which routes to
        // the primary; a primary that never owned the key won't hold it.
        self.inner
            .lock()
            .db
            .get(key)
            .cloned()
            .ok_or(StoreError::KeyNotFound)
    }

    async fn put(&self, key: &str, data: &str, user: &str) -> StoreResult<()> {
        // Replicate before applying: a Put that returns OK is on the backup
        // too. A non-OK answer from the backup fails this Put as-is.
        let replica = {
            let state = self.inner.lock();
            (state.primary == self.address && !state.backup.is_empty())
                .then(|| state.backup.clone())
        };
        if let Some(backup) = replica {
            self.transport.put(&backup, key, data, user).await?;
        }

        self.check_ownership(key)?;

        if !is_post_key(key) {
            // User records (and any other non-post key) are tracked in the
            // local all_users roster.
            let mut state = self.inner.lock();
            let roster = state.db.entry(ALL_USERS_KEY.to_string()).or_default();
            roster_append(roster, key);
            state.db.insert(key.to_string(), data.to_string());
            return Ok(());
        }

        if user.is_empty() {
            self.inner
                .lock()
                .db
                .insert(key.to_string(), data.to_string());
            return Ok(());
        }

        // A post with a known author: the author's post list gains an entry,
        // wherever that list lives.
        let list_key = post_list_key(user);
        let owner = {
            let state = self.inner.lock();
            state.key_owner.get(&extract_id(user)).cloned()
        };
        match owner {
            Some(owner) if owner == self.manager => {
                let mut state = self.inner.lock();
                let roster = state.db.entry(list_key).or_default();
                roster_append(roster, key);
            }
            Some(owner) => self.append_with_retry(&owner, &list_key, key).await?,
            None => return Err(StoreError::NotOwner),
        }

        let mut state = self.inner.lock();
        state.post_user.insert(key.to_string(), user.to_string());
        state.db.insert(key.to_string(), data.to_string());
        Ok(())
    }

    async fn append(&self, key: &str, data: &str) -> StoreResult<()> {
        self.check_ownership(key)?;
        let mut state = self.inner.lock();

        // Roster keys collect entries with a trailing comma each.
        if is_list_key(key) {
            let roster = state.db.entry(key.to_string()).or_default();
            roster_append(roster, data);
            return Ok(());
        }

        if state.db.contains_key(key) {
            let value = state.db.get_mut(key).expect("presence checked above");
            value.push_str(data);
            return Ok(());
        }

        // Absent record: the append doubles as a Put, and the record is
        // indexed in its roster.
        state.db.insert(key.to_string(), data.to_string());
        if key.starts_with("post_") {
            if let Some(user) = state.post_user.get(key).cloned() {
                let roster = state.db.entry(post_list_key(&user)).or_default();
                roster_append(roster, key);
            }
        } else {
            let roster = state.db.entry(ALL_USERS_KEY.to_string()).or_default();
            roster_append(roster, key);
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let mut state = self.inner.lock();
        match state.db.remove(key) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotHeld),
        }
    }

    async fn dump(&self) -> StoreResult<BTreeMap<String, String>> {
        Ok(self.inner.lock().db.clone())
    }

    async fn ping(&self, _server: &str, _viewnumber: u64) -> StoreResult<PingResponse> {
        Err(StoreError::OperationNotSupported(
            "Ping is served by the shardmanager".to_string(),
        ))
    }
}
