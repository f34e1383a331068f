//! User settings file (`config.toml`).
//!
//! Looked up at `$QUESTFLEET_CONFIG`, otherwise
//! `<config dir>/questfleet/config.toml`. A missing file at the default
//! location means built-in defaults; a malformed file is an error.

use std::path::{Path, PathBuf};
use std::time::Duration;

use questfleet_bridge::{find_bridge_executable, CommandRunner, DEFAULT_COMMAND_TIMEOUT};
use questfleet_core::HeadsetConfig;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{FleetError, FleetResult};

/// Overrides the settings file location.
pub const CONFIG_ENV: &str = "QUESTFLEET_CONFIG";

/// Overrides the bridge executable path.
pub const BRIDGE_ENV: &str = "QUESTFLEET_ADB";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeSettings {
    /// Explicit bridge executable; skips the search when set
    pub path: Option<PathBuf>,
    pub command_timeout_secs: u64,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            path: None,
            command_timeout_secs: DEFAULT_COMMAND_TIMEOUT.as_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    pub interval_secs: u64,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self { interval_secs: 5 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsSettings {
    /// Where pulled captures are written
    pub output_dir: PathBuf,
    /// Packages whose presence means a test is running
    pub trigger_apps: Vec<String>,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("metrics"),
            trigger_apps: Vec::new(),
        }
    }
}

/// Contents of `config.toml`. Every section and field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub bridge: BridgeSettings,
    pub monitor: MonitorSettings,
    pub headset: HeadsetConfig,
    pub metrics: MetricsSettings,
}

impl Settings {
    /// Default settings file location.
    pub fn default_path() -> Option<PathBuf> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) if !path.is_empty() => Some(PathBuf::from(path)),
            _ => dirs::config_dir().map(|dir| dir.join("questfleet").join("config.toml")),
        }
    }

    /// Loads settings from `path`, or from the default location.
    ///
    /// An explicitly given file must exist; a missing default file yields
    /// defaults.
    pub fn load(path: Option<&Path>) -> FleetResult<Self> {
        let (path, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => match Self::default_path() {
                Some(path) => (path, false),
                None => return Ok(Self::default()),
            },
        };

        if !required && !path.exists() {
            debug!(path = %path.display(), "No settings file, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path).map_err(|e| FleetError::Settings {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        let settings = Self::from_toml(&content).map_err(|reason| FleetError::Settings {
            path: path.clone(),
            reason,
        })?;
        debug!(path = %path.display(), "Loaded settings");
        Ok(settings)
    }

    pub fn from_toml(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.bridge.command_timeout_secs)
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor.interval_secs)
    }

    /// Chooses the bridge executable: flag, then `env_override`
    /// (`QUESTFLEET_ADB`), then the settings file, then the search.
    pub fn bridge_path(&self, flag: Option<&Path>, env_override: Option<PathBuf>) -> PathBuf {
        if let Some(path) = flag {
            return path.to_path_buf();
        }
        if let Some(path) = env_override.filter(|p| !p.as_os_str().is_empty()) {
            return path;
        }
        if let Some(path) = &self.bridge.path {
            return path.clone();
        }
        find_bridge_executable()
    }

    /// Builds a runner honouring the bridge path precedence and the
    /// configured command timeout.
    pub fn build_runner(&self, flag: Option<&Path>) -> CommandRunner {
        let env_override = std::env::var_os(BRIDGE_ENV).map(PathBuf::from);
        CommandRunner::new(self.bridge_path(flag, env_override))
            .with_default_timeout(self.command_timeout())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_is_defaults() {
        let settings = Settings::from_toml("").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.monitor_interval(), Duration::from_secs(5));
        assert_eq!(settings.command_timeout(), Duration::from_secs(30));
        assert_eq!(settings.metrics.output_dir, PathBuf::from("metrics"));
    }

    #[test]
    fn test_full_file() {
        let content = r#"
[bridge]
path = "/opt/android-sdk/platform-tools/adb"
command_timeout_secs = 45

[monitor]
interval_secs = 2

[headset]
cpu_level = 3
disable_guardian = true

[metrics]
output_dir = "/data/captures"
trigger_apps = ["com.example.game"]
"#;
        let settings = Settings::from_toml(content).unwrap();
        assert_eq!(
            settings.bridge.path,
            Some(PathBuf::from("/opt/android-sdk/platform-tools/adb"))
        );
        assert_eq!(settings.command_timeout(), Duration::from_secs(45));
        assert_eq!(settings.monitor_interval(), Duration::from_secs(2));
        assert_eq!(settings.headset.cpu_level, 3);
        assert_eq!(settings.headset.gpu_level, 4);
        assert!(settings.headset.disable_guardian);
        assert_eq!(settings.metrics.trigger_apps, vec!["com.example.game"]);
    }

    #[test]
    fn test_malformed_file_is_error() {
        assert!(Settings::from_toml("[monitor]\ninterval_secs = \"often\"").is_err());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "not = [valid").unwrap();
        assert!(matches!(
            Settings::load(Some(&path)),
            Err(FleetError::Settings { .. })
        ));
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        assert!(Settings::load(Some(&path)).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[monitor]\ninterval_secs = 9\n").unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.monitor.interval_secs, 9);
    }

    #[test]
    fn test_bridge_path_precedence() {
        let settings = Settings {
            bridge: BridgeSettings {
                path: Some(PathBuf::from("/from/file/adb")),
                ..BridgeSettings::default()
            },
            ..Settings::default()
        };

        assert_eq!(
            settings.bridge_path(Some(Path::new("/from/flag/adb")), Some(PathBuf::from("/from/env/adb"))),
            PathBuf::from("/from/flag/adb")
        );
        assert_eq!(
            settings.bridge_path(None, Some(PathBuf::from("/from/env/adb"))),
            PathBuf::from("/from/env/adb")
        );
        assert_eq!(
            settings.bridge_path(None, None),
            PathBuf::from("/from/file/adb")
        );
        assert_eq!(
            settings.bridge_path(None, Some(PathBuf::new())),
            PathBuf::from("/from/file/adb")
        );
    }
}
