use std::collections::BTreeMap;

use smarthub_protocol::{StatusReply, TelemetryReading};

/// One device's in-progress batch of readings.
///
/// Readings are keyed by sequence number; a repeated sequence number
/// overwrites the earlier reading. The cycle counts as full once it holds
/// `target` distinct sequence numbers, whether or not they fall inside
/// `1..=target`.
#[derive(Debug, Clone)]
pub struct Cycle {
    packets: BTreeMap<u32, TelemetryReading>,
    target: usize,
}

impl Cycle {
    /// Create an empty cycle expecting `target` readings.
    ///
    /// # Panics
    ///
    /// Panics if `target` is zero.
    pub fn new(target: usize) -> Self {
        assert!(target > 0, "cycle target must be > 0");
        Self {
            packets: BTreeMap::new(),
            target,
        }
    }

    /// Store a reading, returning the one it replaced (same sequence number).
    pub fn insert(&mut self, reading: TelemetryReading) -> Option<TelemetryReading> {
        self.packets.insert(reading.sequence, reading)
    }

    /// Number of distinct sequence numbers held.
    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    pub fn target(&self) -> usize {
        self.target
    }

    /// Whether the completeness check should fire.
    pub fn is_full(&self) -> bool {
        self.packets.len() >= self.target
    }

    /// Sequence numbers held, ascending.
    pub fn sequences(&self) -> impl Iterator<Item = u32> + '_ {
        self.packets.keys().copied()
    }

    pub fn get(&self, sequence: u32) -> Option<&TelemetryReading> {
        self.packets.get(&sequence)
    }

    /// Expected sequence numbers (`1..=target`) not yet received, ascending.
    ///
    /// Sequence numbers are `u32`, so a target beyond `u32::MAX` expects
    /// every representable sequence number.
    pub fn missing(&self) -> Vec<u32> {
        let last = u32::try_from(self.target).unwrap_or(u32::MAX);
        (1..=last)
            .filter(|seq| !self.packets.contains_key(seq))
            .collect()
    }

    /// Build the status reply for the current contents and start over.
    pub fn close(&mut self) -> StatusReply {
        let reply = StatusReply {
            received: self.packets.len(),
            target: self.target,
            missing: self.missing(),
        };
        self.packets.clear();
        reply
    }
}
