//! Device registry shared between the connection manager and readers of
//! device state.
//!
//! Only the connection manager (and the reader threads it owns) mutate
//! entries; everyone else works on cloned snapshots.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::device::{ConnectionStatus, Device, DeviceKind};

/// Registry of every configured device, ordered by kind
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: RwLock<BTreeMap<DeviceKind, Device>>,
}

impl DeviceRegistry {
    /// Build a registry from the configured devices. A later entry with the
    /// same kind replaces an earlier one.
    pub fn new(devices: impl IntoIterator<Item = Device>) -> Self {
        let devices = devices.into_iter().map(|d| (d.kind, d)).collect();
        Self {
            devices: RwLock::new(devices),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<DeviceKind, Device>> {
        self.devices.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<DeviceKind, Device>> {
        self.devices.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Snapshot of all devices
    pub fn devices(&self) -> Vec<Device> {
        self.read().values().cloned().collect()
    }

    /// Snapshot of one device
    pub fn get(&self, kind: DeviceKind) -> Option<Device> {
        self.read().get(&kind).cloned()
    }

    pub fn contains(&self, kind: DeviceKind) -> bool {
        self.read().contains_key(&kind)
    }

    /// Configured device kinds in registry order
    pub fn kinds(&self) -> Vec<DeviceKind> {
        self.read().keys().copied().collect()
    }

    pub fn status(&self, kind: DeviceKind) -> Option<ConnectionStatus> {
        self.read().get(&kind).map(|d| d.status)
    }

    pub fn connected_count(&self) -> usize {
        self.read().values().filter(|d| d.is_connected()).count()
    }

    /// Sum of viewers reported by connected boards
    pub fn total_client_count(&self) -> u32 {
        self.read()
            .values()
            .filter(|d| d.is_connected())
            .map(|d| d.client_count)
            .sum()
    }

    /// Apply a mutation to one device. Returns `None` for unknown kinds.
    pub fn update<R>(&self, kind: DeviceKind, f: impl FnOnce(&mut Device) -> R) -> Option<R> {
        self.write().get_mut(&kind).map(f)
    }

    /// Set the status, clearing the error message unless the new status is
    /// `Error`.
    pub fn set_status(&self, kind: DeviceKind, status: ConnectionStatus) {
        self.update(kind, |d| {
            d.status = status;
            if status != ConnectionStatus::Error {
                d.error_message.clear();
            }
        });
    }

    /// Mark a device as failed with the given cause
    pub fn set_error(&self, kind: DeviceKind, message: impl Into<String>) {
        let message = message.into();
        self.update(kind, |d| {
            d.status = ConnectionStatus::Error;
            d.error_message = message;
        });
    }
}
