//! Background liveness monitor for the view service.

use std::sync::Arc;

use tokio::time::interval;
use tokio_util::sync::CancellationToken;

use super::ShardManager;

/// Periodically checks the primary's last ping and fails over when it has
/// gone quiet for longer than the dead-ping threshold.
pub struct ViewMonitor {
    manager: Arc<ShardManager>,
}

impl ViewMonitor {
    pub fn new(manager: Arc<ShardManager>) -> Self {
        Self { manager }
    }

    /// Run until the shutdown token fires.
    pub async fn start(self, shutdown: CancellationToken) {
        let mut tick = interval(self.manager.settings().monitor_interval);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tick.tick() => self.manager.check_primary(),
            }
        }
    }

    /// Spawn the monitor as an owned background task.
    pub fn spawn(manager: Arc<ShardManager>, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(Self::new(manager).start(shutdown))
    }
}
