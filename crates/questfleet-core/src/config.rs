//! Headset configuration applied to devices before a test run.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{DomainError, DomainResult};

/// Lowest CPU/GPU performance level accepted by the headset.
pub const MIN_PERFORMANCE_LEVEL: i32 = 0;

/// Highest CPU/GPU performance level accepted by the headset.
pub const MAX_PERFORMANCE_LEVEL: i32 = 4;

/// Checks that a CPU or GPU level lies within the supported range.
pub fn check_performance_level(field: &str, level: i32) -> DomainResult<()> {
    if (MIN_PERFORMANCE_LEVEL..=MAX_PERFORMANCE_LEVEL).contains(&level) {
        Ok(())
    } else {
        Err(DomainError::invalid(
            field,
            level,
            format!("{MIN_PERFORMANCE_LEVEL}..={MAX_PERFORMANCE_LEVEL}"),
        ))
    }
}

/// Settings applied to every headset by `apply_configuration`.
///
/// Out-of-range CPU/GPU levels are representable. Applying such a
/// configuration skips the level instead of failing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeadsetConfig {
    pub cpu_level: i32,
    pub gpu_level: i32,
    pub disable_proximity: bool,
    pub disable_guardian: bool,
    pub boot_timeout_secs: u64,
    pub wait_timeout_secs: u64,
    pub test_duration_secs: u64,
}

impl Default for HeadsetConfig {
    fn default() -> Self {
        Self {
            cpu_level: 4,
            gpu_level: 4,
            disable_proximity: true,
            disable_guardian: false,
            boot_timeout_secs: 60,
            wait_timeout_secs: 15,
            test_duration_secs: 30,
        }
    }
}

impl HeadsetConfig {
    /// How long to wait for a device to finish booting after a reboot.
    pub fn boot_timeout(&self) -> Duration {
        Duration::from_secs(self.boot_timeout_secs)
    }

    /// Timeout for individual commands issued during batch operations.
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }

    /// Default length of a metrics recording.
    pub fn test_duration(&self) -> Duration {
        Duration::from_secs(self.test_duration_secs)
    }

    #[must_use]
    pub fn cpu_level_in_range(&self) -> bool {
        check_performance_level("cpu_level", self.cpu_level).is_ok()
    }

    #[must_use]
    pub fn gpu_level_in_range(&self) -> bool {
        check_performance_level("gpu_level", self.gpu_level).is_ok()
    }
}
