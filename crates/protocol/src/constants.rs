use std::time::Duration;

/// Default TCP port for the command channel.
pub const DEFAULT_COMMAND_PORT: u16 = 5050;

/// Default UDP port for the telemetry channel.
pub const DEFAULT_TELEMETRY_PORT: u16 = 6060;

/// Number of readings that make up one telemetry cycle.
pub const PACKETS_PER_CYCLE: usize = 10;

/// How long the hub waits for a device to acknowledge a command.
pub const ACK_TIMEOUT: Duration = Duration::from_secs(10);

/// How long a telemetry device waits for a status reply after a cycle.
pub const STATUS_TIMEOUT: Duration = Duration::from_secs(5);

/// Largest single message read from the command channel.
pub const MAX_COMMAND_MESSAGE_SIZE: usize = 1024;

/// Largest telemetry datagram accepted by the hub.
pub const MAX_DATAGRAM_SIZE: usize = 4096;

/// Fixed acknowledgement sent by devices after executing a command.
pub const ACK_MESSAGE: &str = "ACK Command Executed";

/// Operator directive that ends a session without sending anything.
pub const QUIT_DIRECTIVE: &str = "quit";

/// Device kind recorded when a registration could not be parsed.
pub const UNKNOWN_DEVICE_KIND: &str = "unknown";

/// Name prefix for devices whose registration could not be parsed.
pub const UNKNOWN_DEVICE_PREFIX: &str = "UnknownDevice_";
