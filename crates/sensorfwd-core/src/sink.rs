//! Storage sinks.

use crate::record::Record;
use async_trait::async_trait;
use std::time::Duration;

/// A destination that stores records.
///
/// Implementations own their connection to the backing store and must be
/// safe to share across tasks. Implementations log their own failures before
/// returning them; callers only decide whether delivery continues.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Store a single record.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::InvalidRecord`] for malformed records and another
    /// variant when the backing store rejects or cannot receive the write.
    async fn store_record(&self, record: &Record) -> Result<(), SinkError>;
}

/// Sink that writes every record to the log.
#[derive(Debug, Clone)]
pub struct LogSink {
    name: String,
}

impl LogSink {
    /// Create a log sink.
    #[must_use]
    pub fn new() -> Self {
        Self {
            name: "log".to_string(),
        }
    }
}

impl Default for LogSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Sink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn store_record(&self, record: &Record) -> Result<(), SinkError> {
        if let Err(err) = record.validate() {
            tracing::warn!(sink = %self.name, error = %err, "Skipping invalid record");
            return Err(err);
        }

        let fields = serde_json::to_string(&record.fields)
            .map_err(|e| SinkError::InvalidRecord(e.to_string()))?;

        tracing::info!(
            sink = %self.name,
            measurement = %record.measurement,
            tags = ?record.tags,
            fields = %fields,
            timestamp = ?record.timestamp,
            "Record"
        );

        Ok(())
    }
}

/// Errors a sink can report.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SinkError {
    /// Sink could not be created
    #[error("sink init error: {0}")]
    Init(String),
    /// Record is malformed; the write was skipped
    #[error("invalid record: {0}")]
    InvalidRecord(String),
    /// Backing store could not be reached
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// Backing store rejected the write
    #[error("write rejected (status {status}): {message}")]
    Write {
        /// HTTP status code
        status: u16,
        /// Error message from the store
        message: String,
    },
    /// Write did not complete in time
    #[error("write timed out after {0:?}")]
    Timeout(Duration),
}
