/// Errors produced while decoding device traffic.
///
/// All variants are recoverable: a malformed registration falls back to a
/// synthesized identity, and malformed telemetry is dropped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed registration: {0:?}")]
    Registration(String),

    #[error("malformed telemetry: expected 5 fields, got {fields}")]
    TelemetryFields { fields: usize },

    #[error("malformed sequence field: {0:?}")]
    Sequence(String),

    #[error("malformed status reply: {0:?}")]
    Status(String),

    #[error("payload is not valid UTF-8")]
    Utf8,
}
