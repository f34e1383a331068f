//! Operations on a single headset.
//!
//! A [`DeviceHandle`] pairs a device identifier with the shared
//! [`CommandRunner`]; every call becomes `adb -s <id> ...`. Handles hold no
//! mutable state and may be used from many tasks at once.
//!
//! # Panic-Free Guarantees
//!
//! Bridge failures are returned as [`BridgeError`] or [`DeviceError`].
//! Composite operations report which steps failed instead of stopping at the
//! first failure.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use questfleet_bridge::parse::{parse_battery_level, parse_metrics_listing, parse_running_apps};
use questfleet_bridge::{
    device_args, BridgeError, BridgeResult, CommandRunner, ExecError, RunOptions,
};
use questfleet_core::{check_performance_level, DeviceId, DeviceRecord, DeviceStatus, HeadsetConfig};
use tracing::{debug, info};

use crate::error::{DeviceError, DeviceResult};

/// Directory where the metrics service writes its CSV captures.
pub const METRICS_DIR: &str =
    "/sdcard/Android/data/com.oculus.ovrmonitormetricsservice/files/CapturedMetrics";

/// Receiver for metrics service setting broadcasts.
pub const METRICS_COMPONENT: &str =
    "com.oculus.ovrmonitormetricsservice/.SettingsBroadcastReceiver";

const ENABLE_OVERLAY: &str = "com.oculus.ovrmonitormetricsservice.ENABLE_OVERLAY";
const DISABLE_OVERLAY: &str = "com.oculus.ovrmonitormetricsservice.DISABLE_OVERLAY";
const ENABLE_CSV: &str = "com.oculus.ovrmonitormetricsservice.ENABLE_CSV";
const DISABLE_CSV: &str = "com.oculus.ovrmonitormetricsservice.DISABLE_CSV";
const PROXIMITY_CLOSE: &str = "com.oculus.vrpowermanager.prox_close";

const CPU_LEVEL_PROPERTY: &str = "debug.oculus.cpuLevel";
const GPU_LEVEL_PROPERTY: &str = "debug.oculus.gpuLevel";
const GUARDIAN_PAUSE_PROPERTY: &str = "debug.oculus.guardian_pause";

/// UTC timestamp used in local metrics filenames.
const LOCAL_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H-%M-%S";

/// Quotes a value for the device shell.
fn quote(value: &str) -> BridgeResult<String> {
    shlex::try_quote(value)
        .map(|quoted| quoted.into_owned())
        .map_err(|_| BridgeError::MalformedArguments(value.to_string()))
}

fn is_missing_file(err: &BridgeError) -> bool {
    matches!(
        err,
        BridgeError::OperationFailed(ExecError::ExitStatus { stderr, .. })
            if stderr.contains("No such file")
    )
}

/// Handle for one device.
#[derive(Debug, Clone)]
pub struct DeviceHandle {
    id: DeviceId,
    runner: Arc<CommandRunner>,
}

impl DeviceHandle {
    pub fn new(id: DeviceId, runner: Arc<CommandRunner>) -> Self {
        Self { id, runner }
    }

    pub fn id(&self) -> &DeviceId {
        &self.id
    }

    async fn bridge(&self, args: Vec<String>, options: RunOptions) -> BridgeResult<String> {
        self.runner.run_args(device_args(&self.id, args), options).await
    }

    // ========================================================================
    // Shell & Properties
    // ========================================================================

    /// Runs a command in the device shell.
    ///
    /// The command is passed as a single argument and interpreted by the
    /// device shell, so pipes and globs work.
    pub async fn shell(&self, command: &str, capture: bool) -> BridgeResult<String> {
        let options = self.runner.default_options();
        let options = if capture { options } else { options.without_capture() };
        self.shell_with(command, options).await
    }

    pub async fn shell_with(&self, command: &str, options: RunOptions) -> BridgeResult<String> {
        self.bridge(vec!["shell".to_string(), command.to_string()], options)
            .await
    }

    pub async fn set_property(&self, key: &str, value: &str) -> BridgeResult<()> {
        self.shell(&format!("setprop {key} {}", quote(value)?), false)
            .await
            .map(|_| ())
    }

    pub async fn get_property(&self, key: &str) -> BridgeResult<String> {
        self.shell(&format!("getprop {key}"), true).await
    }

    pub async fn model(&self) -> BridgeResult<String> {
        self.get_property("ro.product.model").await
    }

    pub async fn battery_level(&self) -> BridgeResult<u8> {
        let output = self.shell("dumpsys battery", true).await?;
        parse_battery_level(&output).ok_or(BridgeError::Parse {
            what: "battery level",
            output,
        })
    }

    /// Package names of running processes.
    pub async fn running_apps(&self) -> BridgeResult<BTreeSet<String>> {
        let output = self.shell("dumpsys activity processes", true).await?;
        Ok(parse_running_apps(&output))
    }

    pub async fn is_app_running(&self, package: &str) -> BridgeResult<bool> {
        Ok(self.running_apps().await?.contains(package))
    }

    /// Whether any of the candidate packages is running.
    pub async fn has_metrics_trigger_apps(&self, candidates: &[String]) -> BridgeResult<bool> {
        let running = self.running_apps().await?;
        Ok(candidates.iter().any(|app| running.contains(app)))
    }

    // ========================================================================
    // Power
    // ========================================================================

    pub async fn reboot(&self) -> BridgeResult<()> {
        let options = self.runner.default_options().without_capture();
        self.bridge(vec!["reboot".to_string()], options).await?;
        info!(device_id = %self.id, "Reboot requested");
        Ok(())
    }

    pub async fn wait_for_boot(&self, timeout: Duration) -> BridgeResult<bool> {
        self.runner.wait_for_boot(&self.id, timeout).await
    }

    // ========================================================================
    // Files
    // ========================================================================

    pub async fn push_file(&self, local: &Path, remote: &str) -> BridgeResult<()> {
        let args = vec![
            "push".to_string(),
            local.to_string_lossy().into_owned(),
            remote.to_string(),
        ];
        self.bridge(args, self.runner.default_options()).await.map(|_| ())
    }

    pub async fn pull_file(&self, remote: &str, local: &Path) -> BridgeResult<()> {
        let args = vec![
            "pull".to_string(),
            remote.to_string(),
            local.to_string_lossy().into_owned(),
        ];
        self.bridge(args, self.runner.default_options()).await.map(|_| ())
    }

    pub async fn remove_file(&self, remote: &str) -> BridgeResult<()> {
        self.shell(&format!("rm -f {}", quote(remote)?), false)
            .await
            .map(|_| ())
    }

    pub async fn file_exists(&self, remote: &str) -> BridgeResult<bool> {
        match self.shell(&format!("ls {}", quote(remote)?), true).await {
            Ok(output) => Ok(!output.contains("No such file")),
            Err(e) if is_missing_file(&e) => Ok(false),
            Err(e) => Err(e),
        }
    }

    // ========================================================================
    // Headset Settings
    // ========================================================================

    /// Sends `am broadcast -a <action> [-n <component>]`.
    pub async fn send_broadcast(&self, action: &str, component: Option<&str>) -> BridgeResult<()> {
        let mut command = format!("am broadcast -a {action}");
        if let Some(component) = component {
            command.push_str(" -n ");
            command.push_str(component);
        }
        self.shell(&command, false).await.map(|_| ())
    }

    /// Sets the CPU performance level (0-4). Nothing is sent when out of range.
    pub async fn set_cpu_level(&self, level: i32) -> DeviceResult<()> {
        check_performance_level("cpu level", level)?;
        self.set_property(CPU_LEVEL_PROPERTY, &level.to_string()).await?;
        Ok(())
    }

    /// Sets the GPU performance level (0-4). Nothing is sent when out of range.
    pub async fn set_gpu_level(&self, level: i32) -> DeviceResult<()> {
        check_performance_level("gpu level", level)?;
        self.set_property(GPU_LEVEL_PROPERTY, &level.to_string()).await?;
        Ok(())
    }

    pub async fn disable_proximity(&self) -> BridgeResult<()> {
        self.send_broadcast(PROXIMITY_CLOSE, None).await
    }

    pub async fn disable_guardian(&self) -> BridgeResult<()> {
        self.set_property(GUARDIAN_PAUSE_PROPERTY, "1").await
    }

    pub async fn enable_metrics_overlay(&self) -> BridgeResult<()> {
        self.send_broadcast(ENABLE_OVERLAY, Some(METRICS_COMPONENT)).await
    }

    pub async fn disable_metrics_overlay(&self) -> BridgeResult<()> {
        self.send_broadcast(DISABLE_OVERLAY, Some(METRICS_COMPONENT)).await
    }

    pub async fn enable_csv_metrics(&self) -> BridgeResult<()> {
        self.send_broadcast(ENABLE_CSV, Some(METRICS_COMPONENT)).await
    }

    pub async fn disable_csv_metrics(&self) -> BridgeResult<()> {
        self.send_broadcast(DISABLE_CSV, Some(METRICS_COMPONENT)).await
    }

    /// Applies a headset configuration.
    ///
    /// Levels outside 0-4 are skipped, not failed. The metrics overlay and
    /// CSV capture are always switched off and old captures removed; those
    /// cleanup steps do not affect the result.
    pub async fn apply_configuration(&self, config: &HeadsetConfig) -> DeviceResult<()> {
        let mut failed: Vec<&'static str> = Vec::new();

        if config.cpu_level_in_range() {
            if let Err(e) = self.set_cpu_level(config.cpu_level).await {
                debug!(device_id = %self.id, error = %e, "Failed to set CPU level");
                failed.push("cpu level");
            }
        } else {
            debug!(device_id = %self.id, level = config.cpu_level, "Skipping out-of-range CPU level");
        }

        if config.gpu_level_in_range() {
            if let Err(e) = self.set_gpu_level(config.gpu_level).await {
                debug!(device_id = %self.id, error = %e, "Failed to set GPU level");
                failed.push("gpu level");
            }
        } else {
            debug!(device_id = %self.id, level = config.gpu_level, "Skipping out-of-range GPU level");
        }

        if config.disable_proximity {
            if let Err(e) = self.disable_proximity().await {
                debug!(device_id = %self.id, error = %e, "Failed to disable proximity sensor");
                failed.push("proximity");
            }
        }

        if config.disable_guardian {
            if let Err(e) = self.disable_guardian().await {
                debug!(device_id = %self.id, error = %e, "Failed to disable guardian");
                failed.push("guardian");
            }
        }

        if let Err(e) = self.disable_metrics_overlay().await {
            debug!(device_id = %self.id, error = %e, "Cleanup: overlay disable failed");
        }
        if let Err(e) = self.disable_csv_metrics().await {
            debug!(device_id = %self.id, error = %e, "Cleanup: CSV disable failed");
        }
        if let Err(e) = self.clear_metrics_files().await {
            debug!(device_id = %self.id, error = %e, "Cleanup: clearing metrics files failed");
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(DeviceError::ConfigurationIncomplete { steps: failed })
        }
    }

    // ========================================================================
    // Metrics
    // ========================================================================

    /// Removes captured CSV files. CSV capture is switched off first so the
    /// service is not writing while files are deleted.
    pub async fn clear_metrics_files(&self) -> BridgeResult<()> {
        if let Err(e) = self.disable_csv_metrics().await {
            debug!(device_id = %self.id, error = %e, "CSV disable before clearing failed");
        }
        self.shell(&format!("rm -f {METRICS_DIR}/*.csv"), false)
            .await
            .map(|_| ())
    }

    /// Names of captured metrics files (not full paths).
    pub async fn metrics_files(&self) -> BridgeResult<Vec<String>> {
        match self.shell(&format!("ls {METRICS_DIR}"), true).await {
            Ok(listing) => Ok(parse_metrics_listing(&listing)),
            Err(e) if is_missing_file(&e) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    /// Clears old captures and switches on the overlay, then CSV capture.
    ///
    /// If CSV fails after the overlay succeeded, the overlay stays on.
    pub async fn start_metrics_recording(&self) -> DeviceResult<()> {
        if let Err(e) = self.clear_metrics_files().await {
            debug!(device_id = %self.id, error = %e, "Clearing old metrics failed");
        }
        self.enable_metrics_overlay()
            .await
            .map_err(DeviceError::OverlayEnable)?;
        self.enable_csv_metrics().await.map_err(DeviceError::CsvEnable)?;
        info!(device_id = %self.id, "Metrics recording started");
        Ok(())
    }

    /// Switches off CSV capture and the overlay. Both are always attempted.
    pub async fn stop_metrics_recording(&self) -> DeviceResult<()> {
        let mut failed = Vec::new();
        if let Err(e) = self.disable_csv_metrics().await {
            debug!(device_id = %self.id, error = %e, "Failed to disable CSV metrics");
            failed.push("csv");
        }
        if let Err(e) = self.disable_metrics_overlay().await {
            debug!(device_id = %self.id, error = %e, "Failed to disable overlay");
            failed.push("overlay");
        }

        if failed.is_empty() {
            info!(device_id = %self.id, "Metrics recording stopped");
            Ok(())
        } else {
            Err(DeviceError::StopIncomplete { steps: failed })
        }
    }

    /// Copies the newest metrics capture into `local_dir`.
    ///
    /// "Newest" is the lexicographically last filename; the metrics service
    /// names captures by timestamp. Nothing is created locally when the
    /// device has no captures.
    pub async fn pull_latest_metrics(&self, local_dir: &Path) -> DeviceResult<PathBuf> {
        let mut files = self.metrics_files().await?;
        files.sort();
        let latest = files.pop().ok_or(DeviceError::NoMetricsFiles)?;

        let filename = format!(
            "metrics_{}_{}.csv",
            self.id.file_safe(),
            Utc::now().format(LOCAL_TIMESTAMP_FORMAT)
        );
        let local_path = local_dir.join(filename);

        tokio::fs::create_dir_all(local_dir)
            .await
            .map_err(|source| DeviceError::LocalIo {
                path: local_dir.to_path_buf(),
                source,
            })?;

        let remote = format!("{METRICS_DIR}/{latest}");
        self.pull_file(&remote, &local_path).await?;

        if !tokio::fs::try_exists(&local_path).await.unwrap_or(false) {
            return Err(DeviceError::PullUnverified(local_path));
        }

        info!(device_id = %self.id, remote = %remote, local = %local_path.display(), "Pulled metrics");
        Ok(local_path)
    }

    // ========================================================================
    // Snapshot
    // ========================================================================

    /// Builds a fresh record for this device.
    ///
    /// Details are only queried for connected devices; a failed query
    /// leaves its field unknown.
    pub async fn describe(&self, status: DeviceStatus) -> DeviceRecord {
        let mut record = DeviceRecord::new(self.id.clone(), status);
        if !status.is_connected() {
            return record;
        }

        match self.model().await {
            Ok(model) => record.model = model,
            Err(e) => debug!(device_id = %self.id, error = %e, "Model query failed"),
        }
        match self.battery_level().await {
            Ok(level) => record.battery_level = Some(level),
            Err(e) => debug!(device_id = %self.id, error = %e, "Battery query failed"),
        }
        match self.running_apps().await {
            Ok(apps) => record.running_apps = apps,
            Err(e) => debug!(device_id = %self.id, error = %e, "Process query failed"),
        }

        record.last_updated = Utc::now();
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use questfleet_bridge::testing::{Reply, ScriptedExecutor};

    fn handle(executor: &Arc<ScriptedExecutor>) -> DeviceHandle {
        let runner = Arc::new(CommandRunner::with_executor("adb", executor.clone()));
        DeviceHandle::new(DeviceId::new("deviceA"), runner)
    }

    /// Shell command of an invocation, if it was one.
    fn shell_command(args: &[String]) -> Option<&str> {
        match args {
            [_, _, sub, cmd] if sub == "shell" => Some(cmd.as_str()),
            _ => None,
        }
    }

    fn shell_commands(executor: &ScriptedExecutor) -> Vec<String> {
        executor
            .calls()
            .iter()
            .filter_map(|args| shell_command(args).map(String::from))
            .collect()
    }

    // ========================================================================
    // Catalog
    // ========================================================================

    #[tokio::test]
    async fn test_every_call_targets_device() {
        let executor = ScriptedExecutor::shared(|_| Reply::ok(""));
        let device = handle(&executor);

        device.reboot().await.unwrap();
        device.model().await.unwrap();
        device.disable_guardian().await.unwrap();

        for args in executor.calls() {
            assert_eq!(args[0], "-s");
            assert_eq!(args[1], "deviceA");
        }
    }

    #[tokio::test]
    async fn test_battery_level_parse_failure() {
        let executor = ScriptedExecutor::shared(|_| Reply::ok("Current Battery Service state:"));
        let err = handle(&executor).battery_level().await.unwrap_err();
        assert!(matches!(err, BridgeError::Parse { what: "battery level", .. }));
    }

    #[tokio::test]
    async fn test_set_cpu_level_out_of_range_sends_nothing() {
        let executor = ScriptedExecutor::shared(|_| Reply::ok(""));
        let device = handle(&executor);

        let err = device.set_cpu_level(7).await.unwrap_err();
        assert!(matches!(err, DeviceError::LevelOutOfRange(_)));
        assert!(executor.calls().is_empty());

        device.set_gpu_level(2).await.unwrap();
        assert_eq!(shell_commands(&executor), vec!["setprop debug.oculus.gpuLevel 2"]);
    }

    #[tokio::test]
    async fn test_send_broadcast_with_component() {
        let executor = ScriptedExecutor::shared(|_| Reply::ok(""));
        let device = handle(&executor);

        device.enable_metrics_overlay().await.unwrap();
        device.disable_proximity().await.unwrap();

        assert_eq!(
            shell_commands(&executor),
            vec![
                format!("am broadcast -a {ENABLE_OVERLAY} -n {METRICS_COMPONENT}"),
                format!("am broadcast -a {PROXIMITY_CLOSE}"),
            ]
        );
    }

    #[tokio::test]
    async fn test_file_exists() {
        let executor = ScriptedExecutor::shared(|args| match shell_command(args) {
            Some(cmd) if cmd.contains("present") => Reply::ok("/sdcard/present.txt"),
            Some(_) => Reply::fail(1, "ls: /sdcard/missing.txt: No such file or directory"),
            None => Reply::fail(1, "unexpected"),
        });
        let device = handle(&executor);

        assert!(device.file_exists("/sdcard/present.txt").await.unwrap());
        assert!(!device.file_exists("/sdcard/missing.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_remove_file_quotes_path() {
        let executor = ScriptedExecutor::shared(|_| Reply::ok(""));
        handle(&executor)
            .remove_file("/sdcard/My Videos/clip.mp4")
            .await
            .unwrap();
        assert_eq!(
            shell_commands(&executor),
            vec!["rm -f '/sdcard/My Videos/clip.mp4'"]
        );
    }

    #[tokio::test]
    async fn test_clear_metrics_disables_csv_first() {
        let executor = ScriptedExecutor::shared(|_| Reply::ok(""));
        handle(&executor).clear_metrics_files().await.unwrap();

        let commands = shell_commands(&executor);
        assert_eq!(commands.len(), 2);
        assert!(commands[0].contains(DISABLE_CSV));
        assert_eq!(commands[1], format!("rm -f {METRICS_DIR}/*.csv"));
    }

    #[tokio::test]
    async fn test_trigger_apps() {
        let executor = ScriptedExecutor::shared(|_| {
            Reply::ok("  *APP* UID 10102 ProcessRecord{aa01 4410:com.example.game/u0a102}\n")
        });
        let device = handle(&executor);

        assert!(device.is_app_running("com.example.game").await.unwrap());
        assert!(device
            .has_metrics_trigger_apps(&["com.other".to_string(), "com.example.game".to_string()])
            .await
            .unwrap());
        assert!(!device
            .has_metrics_trigger_apps(&["com.other".to_string()])
            .await
            .unwrap());
    }

    // ========================================================================
    // Composites
    // ========================================================================

    #[tokio::test]
    async fn test_apply_configuration_reports_failed_steps() {
        let executor = ScriptedExecutor::shared(|args| match shell_command(args) {
            Some(cmd) if cmd.contains("guardian_pause") => Reply::fail(1, "denied"),
            _ => Reply::ok(""),
        });
        let config = HeadsetConfig {
            disable_guardian: true,
            ..HeadsetConfig::default()
        };

        let err = handle(&executor).apply_configuration(&config).await.unwrap_err();
        match err {
            DeviceError::ConfigurationIncomplete { steps } => assert_eq!(steps, vec!["guardian"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_apply_configuration_cleanup_failure_ignored() {
        let executor = ScriptedExecutor::shared(|args| match shell_command(args) {
            Some(cmd) if cmd.contains("DISABLE") || cmd.starts_with("rm ") => {
                Reply::fail(1, "service missing")
            }
            _ => Reply::ok(""),
        });

        handle(&executor)
            .apply_configuration(&HeadsetConfig::default())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_start_recording_overlay_failure_skips_csv() {
        let executor = ScriptedExecutor::shared(|args| match shell_command(args) {
            Some(cmd) if cmd.contains(ENABLE_OVERLAY) => Reply::fail(1, "no receiver"),
            _ => Reply::ok(""),
        });
        let device = handle(&executor);

        let err = device.start_metrics_recording().await.unwrap_err();
        assert!(matches!(err, DeviceError::OverlayEnable(_)));
        assert!(!shell_commands(&executor)
            .iter()
            .any(|cmd| cmd.contains(ENABLE_CSV)));
    }

    #[tokio::test]
    async fn test_start_recording_csv_failure_keeps_overlay() {
        let executor = ScriptedExecutor::shared(|args| match shell_command(args) {
            Some(cmd) if cmd.contains(ENABLE_CSV) => Reply::fail(1, "no receiver"),
            _ => Reply::ok(""),
        });
        let device = handle(&executor);

        let err = device.start_metrics_recording().await.unwrap_err();
        assert!(matches!(err, DeviceError::CsvEnable(_)));
        assert!(!shell_commands(&executor)
            .iter()
            .any(|cmd| cmd.contains(DISABLE_OVERLAY)));
    }

    #[tokio::test]
    async fn test_stop_recording_attempts_both() {
        let executor = ScriptedExecutor::shared(|args| match shell_command(args) {
            Some(cmd) if cmd.contains(DISABLE_CSV) => Reply::fail(1, "no receiver"),
            _ => Reply::ok(""),
        });
        let device = handle(&executor);

        let err = device.stop_metrics_recording().await.unwrap_err();
        assert!(matches!(err, DeviceError::StopIncomplete { ref steps } if steps == &vec!["csv"]));
        assert!(shell_commands(&executor)
            .iter()
            .any(|cmd| cmd.contains(DISABLE_OVERLAY)));
    }

    #[tokio::test]
    async fn test_pull_unverified_when_file_missing() {
        // Transfer "succeeds" but writes nothing
        let executor = ScriptedExecutor::shared(|args| match shell_command(args) {
            Some(cmd) if cmd.starts_with("ls ") => Reply::ok("a.csv\n"),
            _ => Reply::ok(""),
        });
        let dir = tempfile::tempdir().unwrap();

        let err = handle(&executor)
            .pull_latest_metrics(dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, DeviceError::PullUnverified(_)));
    }

    #[tokio::test]
    async fn test_local_filename_sanitizes_device_id() {
        let executor = ScriptedExecutor::shared(|args| match args {
            [_, _, sub, _remote, local] if sub == "pull" => {
                std::fs::write(local, "fps\n72\n").unwrap();
                Reply::ok("1 file pulled")
            }
            _ => match shell_command(args) {
                Some(cmd) if cmd.starts_with("ls ") => Reply::ok("capture.csv\n"),
                _ => Reply::ok(""),
            },
        });
        let runner = Arc::new(CommandRunner::with_executor("adb", executor.clone()));
        let device = DeviceHandle::new(DeviceId::new("192.168.1.20:5555"), runner);
        let dir = tempfile::tempdir().unwrap();

        let path = device.pull_latest_metrics(dir.path()).await.unwrap();
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("metrics_192.168.1.20_5555_"));
        assert!(name.ends_with(".csv"));
    }

    #[tokio::test]
    async fn test_describe_skips_queries_for_unauthorized() {
        let executor = ScriptedExecutor::shared(|_| Reply::ok(""));
        let record = handle(&executor).describe(DeviceStatus::Unauthorized).await;

        assert_eq!(record.status, DeviceStatus::Unauthorized);
        assert!(executor.calls().is_empty());
    }

    #[tokio::test]
    async fn test_describe_tolerates_failed_queries() {
        let executor = ScriptedExecutor::shared(|args| match shell_command(args) {
            Some("getprop ro.product.model") => Reply::ok("Quest 3"),
            Some("dumpsys battery") => Reply::fail(1, "dumpsys unavailable"),
            _ => Reply::ok(""),
        });
        let record = handle(&executor).describe(DeviceStatus::Connected).await;

        assert_eq!(record.model, "Quest 3");
        assert_eq!(record.battery_level, None);
        assert!(record.running_apps.is_empty());
    }
}
