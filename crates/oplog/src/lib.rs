//! Append-only operational log.
//!
//! Every registration, command, acknowledgement, telemetry line and status
//! reply handled by the hub is recorded here with a local timestamp. The
//! log is a side channel: recording never fails the caller, sink errors are
//! reported through `tracing` and dropped.

mod sink;

pub use sink::{FileSink, LogSink, MemorySink, NullSink};

use std::path::Path;
use std::sync::Arc;

/// Timestamp layout used for every record.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S,%3f";

/// Errors produced while opening a log sink.
#[derive(Debug, thiserror::Error)]
pub enum OpLogError {
    #[error("failed to open log file {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Cloneable handle to an operational log.
#[derive(Clone)]
pub struct OpLog {
    sink: Arc<dyn LogSink>,
}

impl OpLog {
    /// Wraps an existing sink.
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self { sink }
    }

    /// Opens (or creates) `path` in append mode.
    pub fn file(path: impl AsRef<Path>) -> Result<Self, OpLogError> {
        Ok(Self::new(Arc::new(FileSink::open(path)?)))
    }

    /// A log that only mirrors records to `tracing`.
    pub fn disabled() -> Self {
        Self::new(Arc::new(NullSink))
    }

    /// Records one line at `INFO` level.
    pub fn record(&self, line: impl AsRef<str>) {
        let line = line.as_ref();
        tracing::info!(target: "oplog", "{line}");
        self.append("INFO", line);
    }

    /// Records a failure at `WARNING` level.
    pub fn warn(&self, line: impl AsRef<str>) {
        let line = line.as_ref();
        tracing::warn!(target: "oplog", "{line}");
        self.append("WARNING", line);
    }

    fn append(&self, level: &str, line: &str) {
        let stamped = format!(
            "{} [{level}] {line}",
            chrono::Local::now().format(TIMESTAMP_FORMAT)
        );
        if let Err(e) = self.sink.append(&stamped) {
            tracing::warn!("operational log write failed: {e}");
        }
    }
}

impl std::fmt::Debug for OpLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpLog").finish_non_exhaustive()
    }
}
