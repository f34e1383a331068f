//! Error types for device and fleet operations.

use std::path::PathBuf;
use std::time::Duration;

use questfleet_bridge::BridgeError;
use questfleet_core::{DeviceId, DomainError};
use thiserror::Error;

/// Failure of an operation on a single device.
#[derive(Error, Debug)]
pub enum DeviceError {
    /// A bridge command failed or returned unusable output.
    #[error(transparent)]
    Bridge(#[from] BridgeError),

    /// A CPU or GPU level outside the supported range was requested.
    #[error(transparent)]
    LevelOutOfRange(#[from] DomainError),

    /// Some requested configuration steps failed.
    #[error("configuration incomplete, failed steps: {}", .steps.join(", "))]
    ConfigurationIncomplete { steps: Vec<&'static str> },

    /// The metrics overlay broadcast failed; recording was not started.
    #[error("failed to enable metrics overlay: {0}")]
    OverlayEnable(#[source] BridgeError),

    /// The CSV broadcast failed after the overlay was enabled.
    #[error("failed to enable CSV metrics: {0}")]
    CsvEnable(#[source] BridgeError),

    /// Stopping a recording did not fully succeed.
    #[error("failed to stop metrics recording, failed steps: {}", .steps.join(", "))]
    StopIncomplete { steps: Vec<&'static str> },

    /// The device has no captured metrics files.
    #[error("no metrics files found on device")]
    NoMetricsFiles,

    /// The transfer reported success but the local file is missing.
    #[error("pulled metrics file not found at {}", .0.display())]
    PullUnverified(PathBuf),

    /// The device did not finish booting in time.
    #[error("device did not finish booting within {}s", .0.as_secs())]
    BootTimeout(Duration),

    /// A local filesystem operation failed.
    #[error("failed to create {}: {source}", .path.display())]
    LocalIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for single-device operations.
pub type DeviceResult<T> = Result<T, DeviceError>;

/// Failure of a fleet-level operation.
#[derive(Error, Debug)]
pub enum FleetError {
    /// The fleet has not been initialized with a working bridge.
    #[error("fleet is not initialized")]
    NotInitialized,

    /// The bridge executable could not be run.
    #[error("bridge unavailable at {}", .0.display())]
    BridgeUnavailable(PathBuf),

    /// The device is not attached or not connected.
    #[error("unknown or disconnected device: {0}")]
    UnknownDevice(DeviceId),

    /// Monitor intervals must be greater than zero.
    #[error("monitor interval must be greater than zero")]
    InvalidInterval,

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error(transparent)]
    Device(#[from] DeviceError),

    /// The settings file could not be read or parsed.
    #[error("invalid settings file {}: {reason}", .path.display())]
    Settings { path: PathBuf, reason: String },
}

/// Result type for fleet operations.
pub type FleetResult<T> = Result<T, FleetError>;

#[cfg(test)]
mod tests {
    use super::*;
    use questfleet_bridge::ExecError;

    #[test]
    fn test_configuration_incomplete_lists_steps() {
        let err = DeviceError::ConfigurationIncomplete {
            steps: vec!["cpu level", "guardian"],
        };
        assert_eq!(
            err.to_string(),
            "configuration incomplete, failed steps: cpu level, guardian"
        );
    }

    #[test]
    fn test_bridge_errors_are_transparent() {
        let err = FleetError::from(BridgeError::from(ExecError::Signaled));
        assert_eq!(err.to_string(), "operation failed: terminated by signal");

        let err = DeviceError::from(BridgeError::from(ExecError::Signaled));
        assert!(err.to_string().starts_with("operation failed:"));
    }

    #[test]
    fn test_unknown_device_display() {
        let err = FleetError::UnknownDevice(DeviceId::new("abc"));
        assert_eq!(err.to_string(), "unknown or disconnected device: abc");
    }
}
