//! Telemetry datagrams and per-cycle status replies.

use std::fmt;

use crate::error::ProtocolError;

const SEQ_PREFIX: &str = "SEQ:";
const STATUS_PREFIX: &str = "STATUS RECEIVED ";
const MISSING_MARKER: &str = "; MISSING: ";

/// One reading keyed by its position in the device's cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryReading {
    pub sequence: u32,
    pub raw_line: String,
}

/// A decoded telemetry datagram:
/// `<device>,<timestamp>,<sensor>,<value>,SEQ:<n>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryPacket {
    pub device_id: String,
    pub timestamp: String,
    pub sensor_kind: String,
    /// Reported value, kept verbatim.
    pub value: String,
    pub reading: TelemetryReading,
}

/// Decodes one telemetry datagram.
///
/// Exactly five comma-separated fields are required and the last one must
/// be `SEQ:` followed by a non-negative integer.
pub fn decode_telemetry(bytes: &[u8]) -> Result<TelemetryPacket, ProtocolError> {
    let line = std::str::from_utf8(bytes)
        .map_err(|_| ProtocolError::Utf8)?
        .trim();

    let fields: Vec<&str> = line.split(',').collect();
    let [device_id, timestamp, sensor_kind, value, seq] = fields.as_slice() else {
        return Err(ProtocolError::TelemetryFields {
            fields: fields.len(),
        });
    };

    let sequence = seq
        .trim()
        .strip_prefix(SEQ_PREFIX)
        .and_then(|n| n.trim().parse::<u32>().ok())
        .ok_or_else(|| ProtocolError::Sequence((*seq).to_string()))?;

    Ok(TelemetryPacket {
        device_id: device_id.trim().to_string(),
        timestamp: timestamp.trim().to_string(),
        sensor_kind: sensor_kind.trim().to_string(),
        value: value.trim().to_string(),
        reading: TelemetryReading {
            sequence,
            raw_line: line.to_string(),
        },
    })
}

/// Encodes a telemetry datagram (device side).
pub fn encode_telemetry(
    device_id: &str,
    timestamp: &str,
    sensor_kind: &str,
    value: &str,
    sequence: u32,
) -> Vec<u8> {
    format!("{device_id},{timestamp},{sensor_kind},{value},{SEQ_PREFIX}{sequence}").into_bytes()
}

/// Outcome of one telemetry cycle, sent back to the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReply {
    pub received: usize,
    pub target: usize,
    /// Expected sequence numbers that never arrived, ascending.
    pub missing: Vec<u32>,
}

impl StatusReply {
    /// Whether every expected sequence number arrived.
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        encode_status(self.received, self.target, &self.missing)
    }
}

impl fmt::Display for StatusReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{STATUS_PREFIX}{}/{} PACKETS",
            self.received, self.target
        )?;
        if !self.missing.is_empty() {
            let list: Vec<String> = self.missing.iter().map(u32::to_string).collect();
            write!(f, "{MISSING_MARKER}[{}]", list.join(", "))?;
        }
        Ok(())
    }
}

/// Encodes a status line.
///
/// `missing` is written in ascending order regardless of the order given.
pub fn encode_status(received: usize, target: usize, missing: &[u32]) -> Vec<u8> {
    let mut missing = missing.to_vec();
    missing.sort_unstable();
    StatusReply {
        received,
        target,
        missing,
    }
    .to_string()
    .into_bytes()
}

/// Decodes a status line (device side).
pub fn decode_status(bytes: &[u8]) -> Result<StatusReply, ProtocolError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|_| ProtocolError::Utf8)?
        .trim();
    let malformed = || ProtocolError::Status(text.to_string());

    let rest = text.strip_prefix(STATUS_PREFIX).ok_or_else(malformed)?;
    let (counts, missing) = match rest.split_once(MISSING_MARKER) {
        Some((counts, list)) => (counts, Some(list)),
        None => (rest, None),
    };

    let counts = counts.strip_suffix(" PACKETS").ok_or_else(malformed)?;
    let (received, target) = counts.split_once('/').ok_or_else(malformed)?;
    let received = received.parse::<usize>().map_err(|_| malformed())?;
    let target = target.parse::<usize>().map_err(|_| malformed())?;

    let missing = match missing {
        Some(list) => {
            let inner = list
                .strip_prefix('[')
                .and_then(|l| l.strip_suffix(']'))
                .ok_or_else(malformed)?;
            inner
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| s.parse::<u32>().map_err(|_| malformed()))
                .collect::<Result<Vec<_>, _>>()?
        }
        None => Vec::new(),
    };

    Ok(StatusReply {
        received,
        target,
        missing,
    })
}
