//! Device identity, connection status and refreshed device snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::{DomainError, DomainResult};

// ============================================================================
// Type-Safe Identifiers
// ============================================================================

/// Identifier of a device as reported by `adb devices`.
///
/// Usually a hardware serial (e.g. "1WMHH815K10234"), or `host:port` for
/// devices attached over TCP. Stable for a physical device within a session.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    /// Creates a new DeviceId from a string.
    ///
    /// Note: This does not validate the format. Identifiers come from the
    /// bridge's own device listing, so we trust them.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the underlying string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns a form of the identifier usable inside a local filename.
    ///
    /// Characters outside `[A-Za-z0-9._-]` (such as the `:` of TCP
    /// identifiers) are replaced with `_`.
    #[must_use]
    pub fn file_safe(&self) -> String {
        self.0
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for DeviceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for DeviceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for DeviceId {
    type Err = DomainError;

    /// Parses a user-supplied identifier, rejecting empty values and
    /// values containing whitespace (they could never be a bridge serial).
    fn from_str(s: &str) -> DomainResult<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed.chars().any(char::is_whitespace) {
            return Err(DomainError::invalid(
                "device id",
                s,
                "a non-empty serial without whitespace",
            ));
        }
        Ok(Self(trimmed.to_string()))
    }
}

// ============================================================================
// Connection Status
// ============================================================================

/// Connection state of a device as reported by the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DeviceStatus {
    /// Attached and authorized (`device` in bridge output).
    #[serde(rename = "device")]
    Connected,

    /// Attached, but the USB debugging prompt has not been accepted.
    #[serde(rename = "unauthorized")]
    Unauthorized,

    /// Known to the bridge but not responding.
    #[serde(rename = "offline")]
    Offline,

    /// Any other state (recovery, sideload, bootloader, ...).
    #[default]
    #[serde(rename = "unknown")]
    Unknown,
}

impl DeviceStatus {
    /// Maps a status column from `adb devices` to a status.
    #[must_use]
    pub fn from_bridge_label(label: &str) -> Self {
        match label.trim() {
            "device" => Self::Connected,
            "unauthorized" => Self::Unauthorized,
            "offline" => Self::Offline,
            _ => Self::Unknown,
        }
    }

    /// Returns the bridge label for this status.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Connected => "device",
            Self::Unauthorized => "unauthorized",
            Self::Offline => "offline",
            Self::Unknown => "unknown",
        }
    }

    /// Whether commands can be issued to a device in this state.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ============================================================================
// Device Record
// ============================================================================

/// Snapshot of one device produced by a refresh pass.
///
/// Records are never updated in place; every refresh builds new ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub id: DeviceId,
    pub status: DeviceStatus,
    /// Display model name (`ro.product.model`), empty when unknown
    pub model: String,
    /// Battery charge in percent, `None` when unknown
    pub battery_level: Option<u8>,
    pub last_updated: DateTime<Utc>,
    /// Package names of running applications
    pub running_apps: BTreeSet<String>,
}

impl DeviceRecord {
    /// Creates a record with only identity and status known.
    pub fn new(id: DeviceId, status: DeviceStatus) -> Self {
        Self {
            id,
            status,
            model: String::new(),
            battery_level: None,
            last_updated: Utc::now(),
            running_apps: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.status.is_connected()
    }

    /// Model name, or a placeholder for display when unknown.
    #[must_use]
    pub fn model_or_unknown(&self) -> &str {
        if self.model.is_empty() {
            "unknown"
        } else {
            &self.model
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_id_display_and_as_str() {
        let id = DeviceId::new("1WMHH815K10234");
        assert_eq!(id.as_str(), "1WMHH815K10234");
        assert_eq!(id.to_string(), "1WMHH815K10234");
    }

    #[test]
    fn test_device_id_file_safe_replaces_separators() {
        let id = DeviceId::new("192.168.1.20:5555");
        assert_eq!(id.file_safe(), "192.168.1.20_5555");

        let id = DeviceId::new("emulator-5554");
        assert_eq!(id.file_safe(), "emulator-5554");
    }

    #[test]
    fn test_device_id_from_str_rejects_blank() {
        assert!("".parse::<DeviceId>().is_err());
        assert!("two words".parse::<DeviceId>().is_err());
        assert_eq!(
            " abc123 ".parse::<DeviceId>().unwrap(),
            DeviceId::new("abc123")
        );
    }

    #[test]
    fn test_device_id_ordering() {
        let mut ids = vec![DeviceId::new("b"), DeviceId::new("a")];
        ids.sort();
        assert_eq!(ids, vec![DeviceId::new("a"), DeviceId::new("b")]);
    }

    #[test]
    fn test_status_from_bridge_label() {
        assert_eq!(DeviceStatus::from_bridge_label("device"), DeviceStatus::Connected);
        assert_eq!(
            DeviceStatus::from_bridge_label("unauthorized"),
            DeviceStatus::Unauthorized
        );
        assert_eq!(DeviceStatus::from_bridge_label("offline"), DeviceStatus::Offline);
        assert_eq!(DeviceStatus::from_bridge_label("recovery"), DeviceStatus::Unknown);
        assert_eq!(DeviceStatus::from_bridge_label(" device\r"), DeviceStatus::Connected);
    }

    #[test]
    fn test_status_label_round_trip() {
        for status in [
            DeviceStatus::Connected,
            DeviceStatus::Unauthorized,
            DeviceStatus::Offline,
            DeviceStatus::Unknown,
        ] {
            assert_eq!(DeviceStatus::from_bridge_label(status.label()), status);
        }
    }

    #[test]
    fn test_status_serializes_as_bridge_label() {
        let json = serde_json::to_string(&DeviceStatus::Connected).unwrap();
        assert_eq!(json, "\"device\"");
    }

    #[test]
    fn test_record_new_has_unknown_details() {
        let record = DeviceRecord::new(DeviceId::new("abc"), DeviceStatus::Unauthorized);
        assert!(!record.is_connected());
        assert_eq!(record.battery_level, None);
        assert!(record.running_apps.is_empty());
        assert_eq!(record.model_or_unknown(), "unknown");
    }
}
