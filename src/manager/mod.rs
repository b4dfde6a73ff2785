//! Shardmanager: the view service and client-RPC forwarder.
//!
//! Storage servers ping the manager to report liveness and learn their role.
//! The manager designates one primary and at most one backup, numbers each
//! (primary, backup) pair as a view, and only lets followers act on a view
//! once the primary has echoed its number back. Client Get/Put/Append/Delete
//! traffic lands here and is forwarded to the current primary.

pub mod monitor;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::api::KvService;
use crate::config::ManagerSettings;
use crate::error::{StoreError, StoreResult};
use crate::protocol::PingResponse;
use crate::transport::Transport;

/// One (primary, backup) assignment; backup may be empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct View {
    pub primary: String,
    pub backup: String,
}

pub struct ShardManager {
    /// Shardmaster address handed to every pinging server.
    shardmaster: String,
    settings: ManagerSettings,
    transport: Arc<dyn Transport>,
    inner: Mutex<ViewState>,
}

#[derive(Default)]
struct ViewState {
    primary: String,
    backup: String,
    current_view: u64,
    /// Highest view the primary has echoed back in a Ping.
    last_acked: u64,
    /// Full view history, keyed by view number.
    views: HashMap<u64, View>,
    last_ping: HashMap<String, Instant>,
}

impl ShardManager {
    pub fn new(
        shardmaster: String,
        transport: Arc<dyn Transport>,
        settings: ManagerSettings,
    ) -> Self {
        Self {
            shardmaster,
            settings,
            transport,
            inner: Mutex::new(ViewState::default()),
        }
    }

    /// Heartbeat and role discovery.
    ///
    /// The caller identifies itself and reports the highest view it has
    /// seen; the reply tells it which view to act on. A follower is never
    /// handed a view the primary has not acknowledged yet.
    pub fn handle_ping(&self, server: &str, ack: u64) -> StoreResult<PingResponse> {
        let mut state = self.inner.lock();
        let now = Instant::now();

        if state.primary.is_empty() || server == state.primary {
            let newly_installed = state.primary.is_empty();
            if newly_installed {
                state.primary = server.to_string();
            }
            if ack > state.last_acked {
                state.last_acked = ack;
            }
            if newly_installed {
                let view = View {
                    primary: state.primary.clone(),
                    backup: state.backup.clone(),
                };
                state.current_view += 1;
                let number = state.current_view;
                state.views.insert(number, view);
                info!(primary = server, view = number, "installed primary");
            }
            state.last_ping.insert(server.to_string(), now);
            Ok(PingResponse {
                id: state.current_view,
                primary: state.primary.clone(),
                backup: state.backup.clone(),
                shardmaster: self.shardmaster.clone(),
            })
        } else if state.backup.is_empty() {
            state.backup = server.to_string();
            state.current_view += 1;
            let number = state.current_view;
            let view = View {
                primary: state.primary.clone(),
                backup: state.backup.clone(),
            };
            state.views.insert(number, view);
            state.last_ping.insert(server.to_string(), now);
            info!(backup = server, view = number, "installed backup");
            // The new backup gets the acknowledged view, not the new one: it
            // must not act on a view the primary has not confirmed.
            Ok(self.acked_view_response(&state))
        } else if server == state.backup {
            state.last_ping.insert(server.to_string(), now);
            Ok(self.acked_view_response(&state))
        } else {
            Err(StoreError::ViewCapacity)
        }
    }

    fn acked_view_response(&self, state: &ViewState) -> PingResponse {
        let view = state
            .views
            .get(&state.last_acked)
            .cloned()
            .unwrap_or_default();
        PingResponse {
            id: state.last_acked,
            primary: view.primary,
            backup: view.backup,
            shardmaster: self.shardmaster.clone(),
        }
    }

    /// One liveness pass: promote the backup if the primary went quiet.
    ///
    /// This is the only place a view advances without the primary's
    /// acknowledgment; the promoted server supplies it on its next ping.
    pub fn check_primary(&self) {
        let mut state = self.inner.lock();
        if state.primary.is_empty() {
            return;
        }
        let alive = state
            .last_ping
            .get(&state.primary)
            .is_some_and(|t| t.elapsed() <= self.settings.dead_ping_interval);
        if alive {
            return;
        }

        let dead = std::mem::take(&mut state.primary);
        state.last_ping.remove(&dead);
        state.primary = std::mem::take(&mut state.backup);
        state.current_view = (state.last_acked + 1).max(state.current_view);
        let number = state.current_view;
        let view = View {
            primary: state.primary.clone(),
            backup: String::new(),
        };
        state.views.insert(number, view);
        warn!(
            dead = %dead,
            promoted = %state.primary,
            view = number,
            "primary missed its ping window"
        );
    }

    pub fn settings(&self) -> &ManagerSettings {
        &self.settings
    }

    /// Current (unacknowledged included) view, for observability.
    pub fn current_view(&self) -> (u64, View) {
        let state = self.inner.lock();
        (
            state.current_view,
            View {
                primary: state.primary.clone(),
                backup: state.backup.clone(),
            },
        )
    }

    pub fn last_acknowledged_view(&self) -> u64 {
        self.inner.lock().last_acked
    }

    /// Historical view by number, if one was ever published under it.
    pub fn view(&self, number: u64) -> Option<View> {
        self.inner.lock().views.get(&number).cloned()
    }

    fn forward_target(&self) -> StoreResult<String> {
        let state = self.inner.lock();
        if state.primary.is_empty() {
            return Err(StoreError::ForwardFailed);
        }
        Ok(state.primary.clone())
    }
}

// Client traffic: same service surface as a storage server, but four of the
// operations are forwarded verbatim to the current primary.
#[async_trait]
impl KvService for ShardManager {
    async fn get(&self, key: &str) -> StoreResult<String> {
        let primary = self.forward_target()?;
        self.transport
            .get(&primary, key)
            .await
            .map_err(|_| StoreError::ForwardFailed)
    }

    async fn put(&self, key: &str, data: &str, user: &str) -> StoreResult<()> {
        let primary = self.forward_target()?;
        self.transport
            .put(&primary, key, data, user)
            .await
            .map_err(|_| StoreError::ForwardFailed)
    }

    async fn append(&self, key: &str, data: &str) -> StoreResult<()> {
        let primary = self.forward_target()?;
        self.transport
            .append(&primary, key, data)
            .await
            .map_err(|_| StoreError::ForwardFailed)
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let primary = self.forward_target()?;
        self.transport
            .delete(&primary, key)
            .await
            .map_err(|_| StoreError::ForwardFailed)
    }

    async fn dump(&self) -> StoreResult<BTreeMap<String, String>> {
        Err(StoreError::OperationNotSupported(
            "Dump is served by storage servers".to_string(),
        ))
    }

    async fn ping(&self, server: &str, viewnumber: u64) -> StoreResult<PingResponse> {
        self.handle_ping(server, viewnumber)
    }
}
