//! questfleet Bridge - Wrapper around the Android Debug Bridge (`adb`)
//!
//! Layers, bottom up:
//! - [`executor`]: spawns a program, streams and captures its output, and
//!   enforces a timeout
//! - [`runner`]: turns `adb` argument strings into executions and offers the
//!   device-independent bridge operations (listing devices, waiting for boot)
//! - [`parse`]: pure parsers for bridge and device command output
//! - [`locate`]: finds the `adb` executable on this machine
//!
//! With the `testing` feature, [`testing::ScriptedExecutor`] simulates the
//! bridge for tests in dependent crates.

pub mod error;
pub mod executor;
pub mod locate;
pub mod parse;
pub mod runner;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{BridgeError, BridgeResult, ExecError};
pub use executor::{CommandLine, CommandOutcome, Executor, ProcessExecutor, ProgressCallback};
pub use locate::{find_bridge_executable, search_paths, Platform, SearchContext};
pub use parse::DeviceEntry;
pub use runner::{
    device_args, CommandRunner, RunOptions, COMPLETED_SENTINEL, DEFAULT_COMMAND_TIMEOUT,
};
