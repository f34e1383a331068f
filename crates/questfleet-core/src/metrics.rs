//! Metrics recording sessions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::DeviceId;

/// One metrics capture on one device.
///
/// Lifecycle: [`MetricsSession::start`] creates an active session,
/// [`MetricsSession::stop`] makes it inactive. There is no way back to
/// active; a new recording needs a new session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSession {
    device_id: DeviceId,
    started_at: DateTime<Utc>,
    duration: Duration,
    recording: bool,
    file_path: Option<PathBuf>,
}

impl MetricsSession {
    /// Creates an active session starting now.
    pub fn start(device_id: DeviceId, duration: Duration) -> Self {
        Self::start_at(device_id, duration, Utc::now())
    }

    /// Creates an active session with an explicit start time.
    pub fn start_at(device_id: DeviceId, duration: Duration, started_at: DateTime<Utc>) -> Self {
        Self {
            device_id,
            started_at,
            duration,
            recording: true,
            file_path: None,
        }
    }

    /// Marks the recording as stopped.
    pub fn stop(&mut self) {
        self.recording = false;
    }

    /// Records where the captured file was saved locally.
    pub fn mark_pulled(&mut self, path: PathBuf) {
        self.file_path = Some(path);
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    /// Elapsed share of the requested duration, in percent (0-100).
    ///
    /// A zero duration counts as complete.
    #[must_use]
    pub fn progress_percent(&self, now: DateTime<Utc>) -> f64 {
        let total = self.duration.as_secs_f64();
        if total <= 0.0 {
            return 100.0;
        }
        let elapsed = (now - self.started_at)
            .to_std()
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        (elapsed / total * 100.0).clamp(0.0, 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    #[test]
    fn test_start_is_recording() {
        let session = MetricsSession::start(DeviceId::new("a"), Duration::from_secs(30));
        assert!(session.is_recording());
        assert!(session.file_path().is_none());
        assert_eq!(session.duration(), Duration::from_secs(30));
    }

    #[test]
    fn test_stop_is_final() {
        let mut session = MetricsSession::start(DeviceId::new("a"), Duration::from_secs(30));
        session.stop();
        assert!(!session.is_recording());
        session.stop();
        assert!(!session.is_recording());
    }

    #[test]
    fn test_mark_pulled() {
        let mut session = MetricsSession::start(DeviceId::new("a"), Duration::from_secs(1));
        session.stop();
        session.mark_pulled(PathBuf::from("/tmp/metrics_a.csv"));
        assert_eq!(session.file_path(), Some(Path::new("/tmp/metrics_a.csv")));
    }

    #[test]
    fn test_progress_percent() {
        let start = Utc::now();
        let session =
            MetricsSession::start_at(DeviceId::new("a"), Duration::from_secs(10), start);

        assert_eq!(session.progress_percent(start), 0.0);
        let half = session.progress_percent(start + TimeDelta::seconds(5));
        assert!((half - 50.0).abs() < 0.001);
        assert_eq!(session.progress_percent(start + TimeDelta::seconds(60)), 100.0);
        // Clock skew before start clamps to zero
        assert_eq!(session.progress_percent(start - TimeDelta::seconds(5)), 0.0);
    }

    #[test]
    fn test_progress_zero_duration() {
        let session = MetricsSession::start(DeviceId::new("a"), Duration::ZERO);
        assert_eq!(session.progress_percent(Utc::now()), 100.0);
    }
}
