//! Periodic fleet refresh.
//!
//! [`FleetMonitor`] runs [`Fleet::refresh`] on a background task until it is
//! stopped. Uses cooperative shutdown via `CancellationToken`: a refresh
//! already in progress always completes, and once [`FleetMonitor::stop`]
//! returns no further events are emitted by the monitor.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{FleetError, FleetResult};
use crate::registry::Fleet;

struct Running {
    cancel_token: CancellationToken,
    task: JoinHandle<()>,
}

/// Scheduler for periodic refresh passes.
pub struct FleetMonitor {
    fleet: Arc<Fleet>,
    running: Option<Running>,
}

impl FleetMonitor {
    pub fn new(fleet: Arc<Fleet>) -> Self {
        Self {
            fleet,
            running: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|running| !running.task.is_finished())
    }

    /// Starts refreshing every `interval`.
    ///
    /// The first pass runs immediately. Calling `start` while running does
    /// nothing.
    pub fn start(&mut self, interval: Duration) -> FleetResult<()> {
        self.fleet.ensure_initialized()?;
        if interval.is_zero() {
            return Err(FleetError::InvalidInterval);
        }
        if self.is_running() {
            debug!("Monitor already running");
            return Ok(());
        }

        let cancel_token = CancellationToken::new();
        let task = spawn_monitor_task(Arc::clone(&self.fleet), interval, cancel_token.clone());
        self.running = Some(Running { cancel_token, task });
        Ok(())
    }

    /// Stops the monitor and waits for its task to finish.
    ///
    /// Safe to call when not running.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        running.cancel_token.cancel();
        if let Err(e) = running.task.await {
            warn!(error = %e, "Monitor task ended abnormally");
        }
    }
}

impl Drop for FleetMonitor {
    fn drop(&mut self) {
        if let Some(running) = &self.running {
            running.cancel_token.cancel();
        }
    }
}

fn spawn_monitor_task(
    fleet: Arc<Fleet>,
    interval: Duration,
    cancel_token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(interval_ms = interval.as_millis() as u64, "Fleet monitor started");

        loop {
            if cancel_token.is_cancelled() {
                break;
            }

            match fleet.refresh().await {
                Ok(devices) => debug!(device_count = devices.len(), "Refresh pass completed"),
                Err(e) => warn!(error = %e, "Refresh pass failed"),
            }

            tokio::select! {
                biased;

                _ = cancel_token.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        info!("Fleet monitor stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use questfleet_bridge::testing::{Reply, ScriptedExecutor};
    use questfleet_bridge::CommandRunner;

    fn fleet() -> Arc<Fleet> {
        let executor = ScriptedExecutor::shared(|args| match args.first().map(String::as_str) {
            Some("devices") => Reply::ok("List of devices attached\n"),
            _ => Reply::ok(""),
        });
        Arc::new(Fleet::new(Arc::new(CommandRunner::with_executor("adb", executor))))
    }

    #[tokio::test]
    async fn test_start_requires_initialized_fleet() {
        let mut monitor = FleetMonitor::new(fleet());
        assert!(matches!(
            monitor.start(Duration::from_secs(1)),
            Err(FleetError::NotInitialized)
        ));
        assert!(!monitor.is_running());
    }

    #[tokio::test]
    async fn test_start_rejects_zero_interval() {
        let fleet = fleet();
        fleet.initialize().await.unwrap();

        let mut monitor = FleetMonitor::new(fleet);
        assert!(matches!(
            monitor.start(Duration::ZERO),
            Err(FleetError::InvalidInterval)
        ));
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let fleet = fleet();
        fleet.initialize().await.unwrap();

        let mut monitor = FleetMonitor::new(fleet);
        monitor.stop().await;

        monitor.start(Duration::from_millis(50)).unwrap();
        assert!(monitor.is_running());
        monitor.stop().await;
        assert!(!monitor.is_running());
        monitor.stop().await;
    }

    #[tokio::test]
    async fn test_restart_after_stop() {
        let fleet = fleet();
        fleet.initialize().await.unwrap();

        let mut monitor = FleetMonitor::new(fleet);
        monitor.start(Duration::from_millis(50)).unwrap();
        monitor.stop().await;
        monitor.start(Duration::from_millis(50)).unwrap();
        assert!(monitor.is_running());
        monitor.stop().await;
    }
}
