//! Fleet event subscribers.

use questfleet_core::{DeviceId, DeviceRecord, DeviceStatus};
use tokio::sync::mpsc;

/// Identifier returned by [`crate::Fleet::subscribe`].
pub type SubscriberId = u64;

/// Receives fleet events.
///
/// Callbacks run synchronously on the task that produced the event, so
/// implementations should return quickly. All methods default to no-ops.
pub trait FleetObserver: Send + Sync {
    /// A device appeared, changed status, or disappeared (reported offline).
    fn device_status_changed(&self, _id: &DeviceId, _status: DeviceStatus) {}

    /// A refresh pass produced a new snapshot.
    fn device_list_updated(&self, _devices: &[DeviceRecord]) {}

    /// Elapsed share of a metrics recording, 0-100.
    fn metrics_progress(&self, _id: &DeviceId, _percent: f64) {}
}

/// An event as delivered by [`ChannelObserver`].
#[derive(Debug, Clone, PartialEq)]
pub enum FleetEvent {
    StatusChanged { id: DeviceId, status: DeviceStatus },
    ListUpdated(Vec<DeviceRecord>),
    MetricsProgress { id: DeviceId, percent: f64 },
}

/// Observer that forwards every event into an unbounded channel.
///
/// Lets async code consume events with `recv().await` instead of
/// implementing callbacks. Events are dropped once the receiver is gone.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    sender: mpsc::UnboundedSender<FleetEvent>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<FleetEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    fn send(&self, event: FleetEvent) {
        // Receiver gone means nobody is listening any more
        let _ = self.sender.send(event);
    }
}

impl FleetObserver for ChannelObserver {
    fn device_status_changed(&self, id: &DeviceId, status: DeviceStatus) {
        self.send(FleetEvent::StatusChanged {
            id: id.clone(),
            status,
        });
    }

    fn device_list_updated(&self, devices: &[DeviceRecord]) {
        self.send(FleetEvent::ListUpdated(devices.to_vec()));
    }

    fn metrics_progress(&self, id: &DeviceId, percent: f64) {
        self.send(FleetEvent::MetricsProgress {
            id: id.clone(),
            percent,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Silent;
    impl FleetObserver for Silent {}

    #[test]
    fn test_default_methods_are_noops() {
        let observer = Silent;
        observer.device_status_changed(&DeviceId::new("a"), DeviceStatus::Offline);
        observer.device_list_updated(&[]);
        observer.metrics_progress(&DeviceId::new("a"), 50.0);
    }

    #[test]
    fn test_channel_observer_forwards_in_order() {
        let (observer, mut rx) = ChannelObserver::new();
        observer.device_status_changed(&DeviceId::new("a"), DeviceStatus::Connected);
        observer.metrics_progress(&DeviceId::new("a"), 25.0);

        assert_eq!(
            rx.try_recv().unwrap(),
            FleetEvent::StatusChanged {
                id: DeviceId::new("a"),
                status: DeviceStatus::Connected
            }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            FleetEvent::MetricsProgress {
                id: DeviceId::new("a"),
                percent: 25.0
            }
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_channel_observer_survives_dropped_receiver() {
        let (observer, rx) = ChannelObserver::new();
        drop(rx);
        observer.device_list_updated(&[]);
    }
}
