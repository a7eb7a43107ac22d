use std::collections::HashMap;

use smarthub_protocol::constants::PACKETS_PER_CYCLE;
use smarthub_protocol::{StatusReply, TelemetryReading};

use crate::cycle::Cycle;

/// Telemetry cycle state for every device seen on the telemetry channel.
///
/// Cycles are created lazily on a device's first reading and are reset,
/// never removed, after each status reply. Devices are independent: one
/// device's cycle boundary never touches another's.
#[derive(Debug, Clone)]
pub struct CycleTracker {
    cycles: HashMap<String, Cycle>,
    target: usize,
}

impl CycleTracker {
    /// Create a tracker with the default cycle length.
    pub fn new() -> Self {
        Self::with_target(PACKETS_PER_CYCLE)
    }

    /// Create a tracker whose cycles hold `target` readings.
    ///
    /// # Panics
    ///
    /// Panics if `target` is zero.
    pub fn with_target(target: usize) -> Self {
        assert!(target > 0, "cycle target must be > 0");
        Self {
            cycles: HashMap::new(),
            target,
        }
    }

    /// Add a reading to `device`'s cycle.
    ///
    /// Returns the status reply when the cycle reaches its target size, in
    /// which case the cycle has already been reset. Returns `None` while
    /// the cycle is still filling.
    pub fn ingest(&mut self, device: &str, reading: TelemetryReading) -> Option<StatusReply> {
        let target = self.target;
        let cycle = self
            .cycles
            .entry(device.to_owned())
            .or_insert_with(|| Cycle::new(target));

        let sequence = reading.sequence;
        if cycle.insert(reading).is_some() {
            tracing::debug!(device, sequence, "duplicate sequence overwritten");
        }

        if !cycle.is_full() {
            return None;
        }

        let reply = cycle.close();
        tracing::debug!(
            device,
            received = reply.received,
            missing = reply.missing.len(),
            "telemetry cycle closed"
        );
        Some(reply)
    }

    /// Current cycle for `device`, if it has ever sent a reading.
    pub fn cycle(&self, device: &str) -> Option<&Cycle> {
        self.cycles.get(device)
    }

    /// All devices with a cycle, sorted.
    pub fn device_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.cycles.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn target(&self) -> usize {
        self.target
    }
}

impl Default for CycleTracker {
    fn default() -> Self {
        Self::new()
    }
}
