//! Operations applied to every device at once.
//!
//! Each batch runs the single-device operation on all devices concurrently.
//! A failing device is logged and reported in the result; it never stops
//! the others.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use questfleet_bridge::RunOptions;
use questfleet_core::{DeviceId, HeadsetConfig, MetricsSession};
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::device::DeviceHandle;
use crate::error::{DeviceError, DeviceResult, FleetResult};
use crate::registry::Fleet;

/// Whether every device in a batch result succeeded.
fn all_succeeded<T>(results: &BTreeMap<DeviceId, Option<T>>) -> bool {
    results.values().all(Option::is_some)
}

impl Fleet {
    /// Runs `op` on each device concurrently.
    ///
    /// The result has exactly one entry per id; `None` marks a failure.
    async fn fan_out<T, F, Fut>(
        &self,
        operation: &'static str,
        ids: Vec<DeviceId>,
        op: F,
    ) -> BTreeMap<DeviceId, Option<T>>
    where
        T: Send + 'static,
        F: Fn(Arc<DeviceHandle>) -> Fut,
        Fut: Future<Output = DeviceResult<T>> + Send + 'static,
    {
        let mut results: BTreeMap<DeviceId, Option<T>> =
            ids.iter().map(|id| (id.clone(), None)).collect();

        let mut set = JoinSet::new();
        for id in ids {
            let task = op(self.device(&id).await);
            set.spawn(async move { (id, task.await) });
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((id, Ok(value))) => {
                    results.insert(id, Some(value));
                }
                Ok((id, Err(e))) => {
                    warn!(device_id = %id, operation, error = %e, "Device operation failed");
                }
                Err(e) => {
                    warn!(operation, error = %e, "Device task did not complete");
                }
            }
        }

        results
    }

    async fn device_ids(&self) -> FleetResult<Vec<DeviceId>> {
        Ok(self
            .enumerate()
            .await?
            .into_iter()
            .map(|entry| entry.id)
            .collect())
    }

    /// Reboots every device and waits for each to finish booting, bounded
    /// by the default configuration's boot timeout.
    pub async fn reboot_and_wait_all(&self) -> FleetResult<bool> {
        let ids = self.device_ids().await?;
        let boot_timeout = self.default_config().await.boot_timeout();

        let results = self
            .fan_out("reboot", ids, move |device| async move {
                device.reboot().await?;
                if device.wait_for_boot(boot_timeout).await? {
                    Ok(())
                } else {
                    Err(DeviceError::BootTimeout(boot_timeout))
                }
            })
            .await;

        Ok(all_succeeded(&results))
    }

    pub async fn apply_configuration_all(&self, config: &HeadsetConfig) -> FleetResult<bool> {
        let ids = self.device_ids().await?;
        let config = Arc::new(config.clone());

        let results = self
            .fan_out("configure", ids, move |device| {
                let config = Arc::clone(&config);
                async move { device.apply_configuration(&config).await }
            })
            .await;

        Ok(all_succeeded(&results))
    }

    /// Runs a shell command on every device.
    ///
    /// Each command is bounded by the default configuration's wait timeout.
    pub async fn run_command_on_all(&self, command: &str) -> FleetResult<BTreeMap<DeviceId, bool>> {
        let ids = self.device_ids().await?;
        let wait_timeout = self.default_config().await.wait_timeout();
        let command: Arc<str> = Arc::from(command);

        let results = self
            .fan_out("run command", ids, move |device| {
                let command = Arc::clone(&command);
                let options = RunOptions::default()
                    .without_capture()
                    .with_timeout(wait_timeout);
                async move {
                    device
                        .shell_with(&command, options)
                        .await
                        .map(|_| ())
                        .map_err(DeviceError::from)
                }
            })
            .await;

        Ok(results
            .into_iter()
            .map(|(id, outcome)| (id, outcome.is_some()))
            .collect())
    }

    /// Starts a recording on every device.
    ///
    /// Each success replaces the device's previous session with a fresh
    /// active one lasting `duration` (default: the configured test duration).
    pub async fn start_metrics_recording_all(&self, duration: Option<Duration>) -> FleetResult<bool> {
        let ids = self.device_ids().await?;
        let duration = match duration {
            Some(duration) => duration,
            None => self.default_config().await.test_duration(),
        };

        let results = self
            .fan_out("start metrics", ids, |device| async move {
                device.start_metrics_recording().await
            })
            .await;

        let mut sessions = self.sessions.write().await;
        for (id, outcome) in &results {
            if outcome.is_some() {
                info!(device_id = %id, duration_secs = duration.as_secs(), "Metrics session started");
                sessions.insert(id.clone(), MetricsSession::start(id.clone(), duration));
            }
        }

        Ok(all_succeeded(&results))
    }

    /// Stops every active recording session.
    pub async fn stop_metrics_recording_all(&self) -> FleetResult<bool> {
        self.ensure_initialized()?;
        let ids: Vec<DeviceId> = self
            .sessions
            .read()
            .await
            .values()
            .filter(|session| session.is_recording())
            .map(|session| session.device_id().clone())
            .collect();

        let results = self
            .fan_out("stop metrics", ids, |device| async move {
                device.stop_metrics_recording().await
            })
            .await;

        let mut sessions = self.sessions.write().await;
        for (id, outcome) in &results {
            if outcome.is_some() {
                if let Some(session) = sessions.get_mut(id) {
                    session.stop();
                }
            }
        }

        Ok(all_succeeded(&results))
    }

    /// Pulls the latest capture from every device with a session.
    ///
    /// Stopped sessions are removed once their file is pulled; a 100%
    /// progress event is emitted for each pulled file.
    pub async fn pull_metrics_all(
        &self,
        local_dir: &Path,
    ) -> FleetResult<BTreeMap<DeviceId, Option<PathBuf>>> {
        self.ensure_initialized()?;
        let ids: Vec<DeviceId> = self.sessions.read().await.keys().cloned().collect();
        let local_dir: Arc<Path> = Arc::from(local_dir);

        let results = self
            .fan_out("pull metrics", ids, move |device| {
                let local_dir = Arc::clone(&local_dir);
                async move { device.pull_latest_metrics(&local_dir).await }
            })
            .await;

        let mut pulled = Vec::new();
        {
            let mut sessions = self.sessions.write().await;
            for (id, path) in &results {
                let Some(path) = path else { continue };
                let finished = match sessions.get_mut(id) {
                    Some(session) => {
                        session.mark_pulled(path.clone());
                        !session.is_recording()
                    }
                    None => false,
                };
                if finished {
                    sessions.remove(id);
                }
                pulled.push(id.clone());
            }
        }

        for id in &pulled {
            self.emit(|observer| observer.metrics_progress(id, 100.0)).await;
        }

        Ok(results)
    }

    /// Like [`Fleet::pull_metrics_all`], but for every attached device
    /// regardless of sessions.
    pub async fn pull_latest_metrics_from_all(
        &self,
        local_dir: &Path,
    ) -> FleetResult<BTreeMap<DeviceId, Option<PathBuf>>> {
        let ids = self.device_ids().await?;
        let local_dir: Arc<Path> = Arc::from(local_dir);

        Ok(self
            .fan_out("pull metrics", ids, move |device| {
                let local_dir = Arc::clone(&local_dir);
                async move { device.pull_latest_metrics(&local_dir).await }
            })
            .await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_succeeded() {
        let mut results: BTreeMap<DeviceId, Option<()>> = BTreeMap::new();
        assert!(all_succeeded(&results));

        results.insert(DeviceId::new("a"), Some(()));
        assert!(all_succeeded(&results));

        results.insert(DeviceId::new("b"), None);
        assert!(!all_succeeded(&results));
    }
}
