//! Smart hub server.
//!
//! Accepts device connections on the command channel (TCP) and runs one
//! [`Session`] per connection: registration, then an operator-driven
//! command/acknowledgement loop, then teardown. Telemetry datagrams on the
//! telemetry channel (UDP) are reassembled into per-device cycles and
//! answered with a status line once a cycle fills.
//!
//! The [`DeviceRegistry`] is the only state shared between connections.

mod command_source;
mod hub;
mod registry;
mod server;
mod session;
mod telemetry;

pub use command_source::{CommandFuture, CommandQueue, CommandSource};
pub use hub::{Hub, HubConfig, HubLogs};
pub use registry::{DeviceRecord, DeviceRegistry, SessionId};
pub use server::CommandServer;
pub use session::{CloseReason, Session, SessionContext};
pub use telemetry::TelemetryServer;

use std::net::SocketAddr;

/// Errors produced by the hub's listening loops.
///
/// Per-connection and per-datagram failures never surface here; they end
/// the affected session or drop the datagram and are logged.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("accept failed: {0}")]
    Accept(#[source] std::io::Error),

    #[error("telemetry receive failed: {0}")]
    Receive(#[source] std::io::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
