//! Shared registry of devices connected on the command channel.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Identifies one command-channel connection.
pub type SessionId = uuid::Uuid;

/// A registered device and the connection it registered on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRecord {
    pub name: String,
    pub kind: String,
    pub endpoint: SocketAddr,
    pub session: SessionId,
}

/// Device name → record, shared by every session.
///
/// Cloning yields another handle to the same map. Every operation takes
/// the lock only long enough to touch the map; callers never hold it
/// across I/O.
#[derive(Debug, Clone, Default)]
pub struct DeviceRegistry {
    devices: Arc<Mutex<HashMap<String, DeviceRecord>>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // Every mutation is a single map operation, so a poisoned lock still
    // guards a consistent map.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, DeviceRecord>> {
        self.devices.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts `record`, replacing any record with the same name.
    ///
    /// Returns the replaced record.
    pub fn register(&self, record: DeviceRecord) -> Option<DeviceRecord> {
        self.lock().insert(record.name.clone(), record)
    }

    /// Removes the record registered from `endpoint`, if any.
    ///
    /// Idempotent: a second call for the same endpoint is a no-op.
    pub fn unregister_by_endpoint(&self, endpoint: SocketAddr) -> Option<DeviceRecord> {
        let mut devices = self.lock();
        let name = devices
            .iter()
            .find(|(_, record)| record.endpoint == endpoint)
            .map(|(name, _)| name.clone())?;
        devices.remove(&name)
    }

    /// Looks up a device by name.
    pub fn lookup(&self, name: &str) -> Option<DeviceRecord> {
        self.lock().get(name).cloned()
    }

    /// Snapshot of all records, sorted by name.
    pub fn devices(&self) -> Vec<DeviceRecord> {
        let mut devices: Vec<DeviceRecord> = self.lock().values().cloned().collect();
        devices.sort_by(|a, b| a.name.cmp(&b.name));
        devices
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
