//! Simulated devices that speak the hub's two protocols.
//!
//! - [`CommandDevice`] registers on the command channel and acknowledges
//!   every command it receives.
//! - [`TelemetryDevice`] sends cycles of sequenced readings on the
//!   telemetry channel and collects the hub's status replies.

mod command;
mod telemetry;

pub use command::{CommandDevice, CommandDeviceReport};
pub use telemetry::TelemetryDevice;

use smarthub_protocol::ProtocolError;

/// Errors produced by the simulators.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}
