//! The fleet registry: device handles, metrics sessions, the latest device
//! snapshot and event subscribers.
//!
//! # Locking
//!
//! Each piece of shared state sits behind its own `tokio::sync` lock. Locks
//! are never held while calling subscribers or waiting on the bridge, except
//! `refresh_lock`, which exists to serialize whole refresh passes.
//!
//! # Panic-Free Guarantees
//!
//! No `.unwrap()`, `.expect()` or indexing; failures are returned as
//! [`FleetError`].

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use questfleet_bridge::{CommandRunner, DeviceEntry};
use questfleet_core::{DeviceId, DeviceRecord, DeviceStatus, HeadsetConfig, MetricsSession};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::device::DeviceHandle;
use crate::error::{FleetError, FleetResult};
use crate::observer::{FleetObserver, SubscriberId};

type ObserverList = Vec<(SubscriberId, Arc<dyn FleetObserver>)>;

/// Registry of the headsets reachable through one bridge.
pub struct Fleet {
    runner: Arc<CommandRunner>,
    initialized: AtomicBool,

    /// Memoized handles, created on first use
    devices: RwLock<HashMap<DeviceId, Arc<DeviceHandle>>>,

    /// At most one session per device
    pub(crate) sessions: RwLock<BTreeMap<DeviceId, MetricsSession>>,

    /// Result of the last refresh pass
    snapshot: RwLock<Vec<DeviceRecord>>,

    default_config: RwLock<HeadsetConfig>,

    observers: RwLock<ObserverList>,
    next_subscriber: AtomicU64,

    refresh_lock: Mutex<()>,
}

impl Fleet {
    pub fn new(runner: Arc<CommandRunner>) -> Self {
        Self::with_config(runner, HeadsetConfig::default())
    }

    pub fn with_config(runner: Arc<CommandRunner>, config: HeadsetConfig) -> Self {
        Self {
            runner,
            initialized: AtomicBool::new(false),
            devices: RwLock::new(HashMap::new()),
            sessions: RwLock::new(BTreeMap::new()),
            snapshot: RwLock::new(Vec::new()),
            default_config: RwLock::new(config),
            observers: RwLock::new(Vec::new()),
            next_subscriber: AtomicU64::new(1),
            refresh_lock: Mutex::new(()),
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Checks that the bridge works. Required before enumeration, batch
    /// operations or monitoring.
    pub async fn initialize(&self) -> FleetResult<()> {
        if !self.runner.is_available().await {
            warn!(bridge = %self.runner.bridge_path().display(), "Bridge unavailable");
            return Err(FleetError::BridgeUnavailable(
                self.runner.bridge_path().to_path_buf(),
            ));
        }
        self.initialized.store(true, Ordering::SeqCst);
        info!(bridge = %self.runner.bridge_path().display(), "Fleet initialized");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    pub(crate) fn ensure_initialized(&self) -> FleetResult<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(FleetError::NotInitialized)
        }
    }

    // ========================================================================
    // Devices
    // ========================================================================

    /// Returns the handle for `id`, creating it on first use.
    ///
    /// Repeated calls with the same id return the same instance.
    pub async fn device(&self, id: &DeviceId) -> Arc<DeviceHandle> {
        if let Some(handle) = self.devices.read().await.get(id) {
            return Arc::clone(handle);
        }

        let mut devices = self.devices.write().await;
        let handle = devices.entry(id.clone()).or_insert_with(|| {
            debug!(device_id = %id, "Creating device handle");
            Arc::new(DeviceHandle::new(id.clone(), Arc::clone(&self.runner)))
        });
        Arc::clone(handle)
    }

    /// Lists attached devices without querying details.
    pub async fn enumerate(&self) -> FleetResult<Vec<DeviceEntry>> {
        self.ensure_initialized()?;
        Ok(self.runner.list_devices().await?)
    }

    /// Returns the handle for `id` if the device is attached and connected.
    pub async fn connected_device(&self, id: &DeviceId) -> FleetResult<Arc<DeviceHandle>> {
        let connected = self
            .enumerate()
            .await?
            .into_iter()
            .any(|entry| &entry.id == id && entry.status.is_connected());
        if connected {
            Ok(self.device(id).await)
        } else {
            Err(FleetError::UnknownDevice(id.clone()))
        }
    }

    /// Enumerates and describes every attached device, ordered by id.
    pub async fn connected_devices(&self) -> FleetResult<Vec<DeviceRecord>> {
        let entries = self.enumerate().await?;

        let mut set = JoinSet::new();
        for entry in entries {
            let handle = self.device(&entry.id).await;
            set.spawn(async move { handle.describe(entry.status).await });
        }

        let mut records = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(record) => records.push(record),
                Err(e) => warn!(error = %e, "Device query task failed"),
            }
        }
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }

    // ========================================================================
    // Refresh
    // ========================================================================

    /// Runs one refresh pass and notifies subscribers.
    ///
    /// Emits a status change for every new or changed device and an
    /// offline status for every device that disappeared, then the new list,
    /// then progress for each active recording. Passes never interleave.
    pub async fn refresh(&self) -> FleetResult<Vec<DeviceRecord>> {
        let _pass = self.refresh_lock.lock().await;

        let records = self.connected_devices().await?;

        let changes = {
            let mut snapshot = self.snapshot.write().await;
            let changes = status_changes(&snapshot, &records);
            *snapshot = records.clone();
            changes
        };

        for (id, status) in &changes {
            debug!(device_id = %id, status = %status, "Device status changed");
            self.emit(|observer| observer.device_status_changed(id, *status))
                .await;
        }
        self.emit(|observer| observer.device_list_updated(&records))
            .await;

        let now = Utc::now();
        let progress: Vec<(DeviceId, f64)> = self
            .sessions
            .read()
            .await
            .values()
            .filter(|session| session.is_recording())
            .map(|session| (session.device_id().clone(), session.progress_percent(now)))
            .collect();
        for (id, percent) in &progress {
            self.emit(|observer| observer.metrics_progress(id, *percent))
                .await;
        }

        Ok(records)
    }

    /// The device list published by the last refresh pass.
    pub async fn snapshot(&self) -> Vec<DeviceRecord> {
        self.snapshot.read().await.clone()
    }

    // ========================================================================
    // Configuration & Sessions
    // ========================================================================

    pub async fn default_config(&self) -> HeadsetConfig {
        self.default_config.read().await.clone()
    }

    pub async fn set_default_config(&self, config: HeadsetConfig) {
        *self.default_config.write().await = config;
    }

    /// All metrics sessions, ordered by device id.
    pub async fn metrics_sessions(&self) -> Vec<MetricsSession> {
        self.sessions.read().await.values().cloned().collect()
    }

    pub async fn metrics_session(&self, id: &DeviceId) -> Option<MetricsSession> {
        self.sessions.read().await.get(id).cloned()
    }

    // ========================================================================
    // Subscribers
    // ========================================================================

    pub async fn subscribe(&self, observer: Arc<dyn FleetObserver>) -> SubscriberId {
        let id = self.next_subscriber.fetch_add(1, Ordering::Relaxed);
        self.observers.write().await.push((id, observer));
        debug!(subscriber_id = id, "Subscriber added");
        id
    }

    /// Removes a subscriber. Returns whether it was registered.
    pub async fn unsubscribe(&self, id: SubscriberId) -> bool {
        let mut observers = self.observers.write().await;
        let before = observers.len();
        observers.retain(|(subscriber, _)| *subscriber != id);
        before != observers.len()
    }

    pub async fn subscriber_count(&self) -> usize {
        self.observers.read().await.len()
    }

    /// Calls `f` for every subscriber, outside the subscriber lock.
    pub(crate) async fn emit<F>(&self, f: F)
    where
        F: Fn(&dyn FleetObserver),
    {
        let observers: Vec<Arc<dyn FleetObserver>> = self
            .observers
            .read()
            .await
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();
        for observer in observers {
            f(observer.as_ref());
        }
    }
}

/// Status transitions between two snapshots, in device id order.
fn status_changes(previous: &[DeviceRecord], current: &[DeviceRecord]) -> Vec<(DeviceId, DeviceStatus)> {
    let before: BTreeMap<&DeviceId, DeviceStatus> =
        previous.iter().map(|r| (&r.id, r.status)).collect();
    let after: BTreeMap<&DeviceId, DeviceStatus> =
        current.iter().map(|r| (&r.id, r.status)).collect();

    let mut changes = Vec::new();
    for (id, status) in &after {
        if before.get(id) != Some(status) {
            changes.push(((*id).clone(), *status));
        }
    }
    for (id, status) in &before {
        if !after.contains_key(id) && *status != DeviceStatus::Offline {
            changes.push(((*id).clone(), DeviceStatus::Offline));
        }
    }
    changes
}
