//! Parsers for bridge and device command output.
//!
//! Each parser is a pure function over captured text so it can be tested
//! without a device. Unexpected lines are skipped rather than treated as
//! errors; device firmware versions differ in their output details.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use questfleet_core::{DeviceId, DeviceStatus};
use regex::Regex;

/// One line of `adb devices` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEntry {
    pub id: DeviceId,
    pub status: DeviceStatus,
}

/// Parses the output of `adb devices`.
pub fn parse_device_list(text: &str) -> Vec<DeviceEntry> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !line.starts_with("List of devices"))
        .filter(|line| !line.starts_with('*'))
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let id = fields.next()?;
            let status = fields.next()?;
            Some(DeviceEntry {
                id: DeviceId::new(id),
                status: DeviceStatus::from_bridge_label(status),
            })
        })
        .collect()
}

fn battery_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"level: (\d+)").ok()).as_ref()
}

fn package_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b[A-Za-z][A-Za-z0-9_]*(?:\.[A-Za-z0-9_]+)+").ok())
        .as_ref()
}

/// Extracts the charge level from `dumpsys battery` output.
///
/// Returns `None` if no `level:` line is present or the value exceeds 100.
pub fn parse_battery_level(text: &str) -> Option<u8> {
    let captures = battery_regex()?.captures(text)?;
    let level: u8 = captures.get(1)?.as_str().parse().ok()?;
    (level <= 100).then_some(level)
}

/// Extracts a package name from one line of a process dump.
///
/// Picks the first dotted identifier starting with a letter, e.g.
/// `com.oculus.systemux` from
/// `ProcessRecord{5c6a8f1 2345:com.oculus.systemux/u0a77}`.
pub fn package_from_process_line(line: &str) -> Option<&str> {
    package_regex()?.find(line).map(|m| m.as_str())
}

/// Collects running package names from `dumpsys activity processes` output.
pub fn parse_running_apps(text: &str) -> BTreeSet<String> {
    text.lines()
        .filter(|line| {
            line.contains("ProcessRecord{") || (line.contains("PERS") && line.contains(':'))
        })
        .filter_map(package_from_process_line)
        .map(str::to_string)
        .collect()
}

/// Extracts metrics file names from a directory listing.
pub fn parse_metrics_listing(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| line.contains(".csv") && !line.contains("No such file"))
        .map(str::to_string)
        .collect()
}

/// Whether `getprop sys.boot_completed` reports a finished boot.
pub fn is_boot_completed(text: &str) -> bool {
    text.trim() == "1"
}
