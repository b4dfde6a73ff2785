//! Timing and sizing knobs for the three components.

use std::time::Duration;

/// Size of the key-id universe `[0, key_space - 1]` partitioned by the
/// shardmaster.
pub const DEFAULT_KEY_SPACE: u64 = 1000;

/// Storage-server heartbeat and reconcile period.
pub const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Backoff between attempts when contacting another server.
pub const RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// Maximum number of attempts when contacting another server.
pub const MAX_SERVER_ATTEMPTS: u32 = 1000;

/// Shardmanager liveness monitor period.
pub const MONITOR_INTERVAL: Duration = Duration::from_millis(1000);

/// Ping age past which the primary is declared dead.
pub const DEAD_PING_INTERVAL: Duration = Duration::from_millis(2000);

/// Knobs for a storage server's background loops.
#[derive(Debug, Clone)]
pub struct NodeSettings {
    pub heartbeat_interval: Duration,
    pub reconcile_interval: Duration,
    pub retry_backoff: Duration,
    pub max_server_attempts: u32,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval: TICK_INTERVAL,
            reconcile_interval: TICK_INTERVAL,
            retry_backoff: RETRY_BACKOFF,
            max_server_attempts: MAX_SERVER_ATTEMPTS,
        }
    }
}

/// Knobs for the shardmanager's liveness monitor.
#[derive(Debug, Clone)]
pub struct ManagerSettings {
    pub monitor_interval: Duration,
    pub dead_ping_interval: Duration,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            monitor_interval: MONITOR_INTERVAL,
            dead_ping_interval: DEAD_PING_INTERVAL,
        }
    }
}
