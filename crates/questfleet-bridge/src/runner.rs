//! Running `adb` subcommands.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use questfleet_core::DeviceId;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::executor::{CommandLine, Executor, ProcessExecutor, ProgressCallback};
use crate::parse::{is_boot_completed, parse_device_list, DeviceEntry};
use crate::{BridgeError, BridgeResult};

/// Returned by [`CommandRunner::run`] when output capture is off.
pub const COMPLETED_SENTINEL: &str = "success";

/// Default time limit for a single bridge command.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Delay between `sys.boot_completed` polls.
const BOOT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Stand-in deadline for timeouts too large to add to the clock.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Per-call options for [`CommandRunner::run`].
#[derive(Clone)]
pub struct RunOptions {
    /// Return trimmed stdout instead of [`COMPLETED_SENTINEL`]
    pub capture_output: bool,
    pub timeout: Duration,
    pub progress: Option<ProgressCallback>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            capture_output: true,
            timeout: DEFAULT_COMMAND_TIMEOUT,
            progress: None,
        }
    }
}

impl fmt::Debug for RunOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunOptions")
            .field("capture_output", &self.capture_output)
            .field("timeout", &self.timeout)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl RunOptions {
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn without_capture(mut self) -> Self {
        self.capture_output = false;
        self
    }

    #[must_use]
    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }
}

/// Builds `-s <id> <args...>`.
pub fn device_args<I, S>(id: &DeviceId, args: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut argv = vec!["-s".to_string(), id.as_str().to_string()];
    argv.extend(args.into_iter().map(Into::into));
    argv
}

/// Invokes the bridge executable through an [`Executor`].
///
/// Cheap to share behind an `Arc`; holds no per-call state.
pub struct CommandRunner {
    bridge: PathBuf,
    executor: Arc<dyn Executor>,
    default_timeout: Duration,
}

impl fmt::Debug for CommandRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandRunner")
            .field("bridge", &self.bridge)
            .field("default_timeout", &self.default_timeout)
            .finish_non_exhaustive()
    }
}

impl CommandRunner {
    /// Creates a runner for the given bridge path using real processes.
    pub fn new(bridge: impl Into<PathBuf>) -> Self {
        Self::with_executor(bridge, Arc::new(ProcessExecutor))
    }

    pub fn with_executor(bridge: impl Into<PathBuf>, executor: Arc<dyn Executor>) -> Self {
        Self {
            bridge: bridge.into(),
            executor,
            default_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Overrides the timeout used by [`CommandRunner::default_options`].
    #[must_use]
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn bridge_path(&self) -> &Path {
        &self.bridge
    }

    /// Capturing options with this runner's default timeout.
    pub fn default_options(&self) -> RunOptions {
        RunOptions::default().with_timeout(self.default_timeout)
    }

    /// Runs the bridge with a shell-style argument string.
    ///
    /// The string is split with POSIX word rules, so quoted arguments keep
    /// their spaces: `-s abc shell "ls /sdcard"`.
    pub async fn run(&self, args: &str, options: RunOptions) -> BridgeResult<String> {
        let argv =
            shlex::split(args).ok_or_else(|| BridgeError::MalformedArguments(args.to_string()))?;
        self.run_args(argv, options).await
    }

    /// Runs the bridge with a prepared argument vector.
    pub async fn run_args(&self, args: Vec<String>, options: RunOptions) -> BridgeResult<String> {
        let line = CommandLine::new(self.bridge.clone(), args);
        let outcome = self
            .executor
            .execute(&line, options.timeout, options.progress)
            .await;

        if let Some(error) = outcome.error {
            debug!(command = %line, error = %error, "Bridge command failed");
            return Err(BridgeError::OperationFailed(error));
        }

        let stderr = outcome.stderr.trim();
        if !stderr.is_empty() && !is_bridge_banner(stderr) {
            debug!(command = %line, stderr, "Bridge command wrote to stderr");
        }

        if options.capture_output {
            Ok(outcome.stdout.trim().to_string())
        } else {
            Ok(COMPLETED_SENTINEL.to_string())
        }
    }

    /// Runs `-s <id> <args>` against one device.
    pub async fn run_on(
        &self,
        id: &DeviceId,
        args: &str,
        options: RunOptions,
    ) -> BridgeResult<String> {
        let words =
            shlex::split(args).ok_or_else(|| BridgeError::MalformedArguments(args.to_string()))?;
        self.run_args(device_args(id, words), options).await
    }

    /// Whether the bridge executable runs at all.
    pub async fn is_available(&self) -> bool {
        match self.run("version", self.default_options()).await {
            Ok(version) => {
                trace!(version = %version, "Bridge available");
                true
            }
            Err(e) => {
                debug!(error = %e, bridge = %self.bridge.display(), "Bridge unavailable");
                false
            }
        }
    }

    /// Lists attached devices with their connection status.
    pub async fn list_devices(&self) -> BridgeResult<Vec<DeviceEntry>> {
        let output = self.run("devices", self.default_options()).await?;
        Ok(parse_device_list(&output))
    }

    /// Waits until the device reports a completed boot.
    ///
    /// Returns `Ok(false)` if the deadline passes first. Poll failures are
    /// expected while the device restarts and are not errors.
    pub async fn wait_for_boot(&self, id: &DeviceId, timeout: Duration) -> BridgeResult<bool> {
        let deadline = deadline_after(timeout);

        self.run_args(
            device_args(id, ["wait-for-device"]),
            RunOptions::default().with_timeout(timeout),
        )
        .await?;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let options = RunOptions::default()
                .with_timeout(remaining.max(BOOT_POLL_INTERVAL).min(self.default_timeout));

            match self
                .run_args(device_args(id, ["shell", "getprop sys.boot_completed"]), options)
                .await
            {
                Ok(value) if is_boot_completed(&value) => {
                    debug!(device_id = %id, "Device boot completed");
                    return Ok(true);
                }
                Ok(_) => trace!(device_id = %id, "Device still booting"),
                Err(e) => trace!(device_id = %id, error = %e, "Boot poll failed"),
            }

            if Instant::now() >= deadline {
                debug!(device_id = %id, timeout_secs = timeout.as_secs(), "Timed out waiting for boot");
                return Ok(false);
            }
            tokio::time::sleep(BOOT_POLL_INTERVAL).await;
        }
    }
}

/// `now + timeout`, saturating at a far-future instant.
fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

/// Whether stderr text is the bridge's own daemon/warning chatter.
fn is_bridge_banner(stderr: &str) -> bool {
    stderr.contains("daemon") || stderr.contains("Warning")
}
