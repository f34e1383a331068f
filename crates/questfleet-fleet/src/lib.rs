//! questfleet Fleet - Registry, monitoring and batch control of headsets
//!
//! - [`DeviceHandle`]: every operation on one device
//! - [`Fleet`]: memoized handles, metrics sessions, the refreshed device
//!   snapshot and [`FleetObserver`] subscribers; batch operations fan out
//!   over all devices concurrently
//! - [`FleetMonitor`]: periodic refresh on a background task
//! - [`Settings`]: the user's `config.toml`

mod batch;
pub mod device;
pub mod error;
pub mod monitor;
pub mod observer;
pub mod registry;
pub mod settings;

pub use device::{DeviceHandle, METRICS_COMPONENT, METRICS_DIR};
pub use error::{DeviceError, DeviceResult, FleetError, FleetResult};
pub use monitor::FleetMonitor;
pub use observer::{ChannelObserver, FleetEvent, FleetObserver, SubscriberId};
pub use registry::Fleet;
pub use settings::Settings;
