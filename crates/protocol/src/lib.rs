//! Wire formats for Smart Hub device traffic.
//!
//! Two text protocols are spoken between devices and the hub:
//!
//! - the **command channel** (TCP): a one-shot registration line
//!   (`DEVICE <name> TYPE <kind>`), then alternating hub commands and
//!   device acknowledgements (`ACK Command Executed`);
//! - the **telemetry channel** (UDP): comma-delimited readings
//!   (`<device>,<timestamp>,<sensor>,<value>,SEQ:<n>`) answered by one
//!   `STATUS RECEIVED ...` line per cycle.
//!
//! Everything here is a pure transform; no I/O happens in this crate.

pub mod command;
pub mod constants;
pub mod error;
pub mod registration;
pub mod telemetry;

pub use command::{Directive, decode_ack, encode_ack, encode_command, is_quit};
pub use error::ProtocolError;
pub use registration::{Registration, decode_registration, encode_registration};
pub use telemetry::{
    StatusReply, TelemetryPacket, TelemetryReading, decode_status, decode_telemetry,
    encode_status, encode_telemetry,
};
