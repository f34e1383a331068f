//! questfleet Core - Shared types for VR headset fleet management
//!
//! This crate provides the domain value types shared between the bridge
//! wrapper (`questfleet-bridge`), the fleet layer (`questfleet-fleet`) and
//! the `questfleet` binary.
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod config;
pub mod device;
pub mod error;
pub mod metrics;

// Re-exports for convenience
pub use config::{check_performance_level, HeadsetConfig, MAX_PERFORMANCE_LEVEL, MIN_PERFORMANCE_LEVEL};
pub use device::{DeviceId, DeviceRecord, DeviceStatus};
pub use error::{DomainError, DomainResult};
pub use metrics::MetricsSession;
