//! Registration line sent once by a device when it opens the command channel.

use crate::constants::{UNKNOWN_DEVICE_KIND, UNKNOWN_DEVICE_PREFIX};
use crate::error::ProtocolError;

/// Identity announced by a device: `DEVICE <name> TYPE <kind>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub name: String,
    pub kind: String,
}

impl Registration {
    /// Identity used when a device's registration line cannot be parsed.
    ///
    /// The name is derived from the peer's source port so it stays unique
    /// per connected endpoint.
    pub fn fallback(port: u16) -> Self {
        Self {
            name: format!("{UNKNOWN_DEVICE_PREFIX}{port}"),
            kind: UNKNOWN_DEVICE_KIND.to_string(),
        }
    }
}

/// Decodes a registration message.
///
/// Exactly four whitespace-separated tokens are accepted, with `DEVICE`
/// and `TYPE` in the first and third positions.
pub fn decode_registration(bytes: &[u8]) -> Result<Registration, ProtocolError> {
    let text = std::str::from_utf8(bytes).map_err(|_| ProtocolError::Utf8)?;
    let tokens: Vec<&str> = text.split_whitespace().collect();

    match tokens.as_slice() {
        ["DEVICE", name, "TYPE", kind] => Ok(Registration {
            name: (*name).to_string(),
            kind: (*kind).to_string(),
        }),
        _ => Err(ProtocolError::Registration(text.trim().to_string())),
    }
}

/// Encodes a registration message (device side).
pub fn encode_registration(name: &str, kind: &str) -> Vec<u8> {
    format!("DEVICE {name} TYPE {kind}\n").into_bytes()
}
