//! Fan-out of records to every registered sink.

use crate::record::Record;
use crate::sink::{Sink, SinkError};
use std::time::Duration;
use tokio::time::timeout;

/// Default bound on a single sink write.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Ordered set of sinks that every record is delivered to.
///
/// Sinks are written one after another in registration order. Each write is
/// bounded by the write timeout. A failed or timed-out write does not affect
/// delivery to the remaining sinks; sinks log their own failures and the
/// dispatcher logs timeouts.
pub struct Dispatcher {
    sinks: Vec<Box<dyn Sink>>,
    write_timeout: Duration,
}

impl Dispatcher {
    /// Create a dispatcher with no sinks.
    #[must_use]
    pub fn new(write_timeout: Duration) -> Self {
        Self {
            sinks: Vec::new(),
            write_timeout,
        }
    }

    /// Register a sink after those already registered.
    pub fn register(&mut self, sink: Box<dyn Sink>) {
        tracing::info!(sink = sink.name(), "Registered sink");
        self.sinks.push(sink);
    }

    /// Builder form of [`Dispatcher::register`].
    #[must_use]
    pub fn with_sink(mut self, sink: impl Sink + 'static) -> Self {
        self.register(Box::new(sink));
        self
    }

    /// Number of registered sinks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// Whether no sink is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Names of the registered sinks, in order.
    #[must_use]
    pub fn sink_names(&self) -> Vec<&str> {
        self.sinks.iter().map(|sink| sink.name()).collect()
    }

    /// Deliver a record to every sink.
    pub async fn dispatch(&self, record: &Record) {
        for sink in &self.sinks {
            let result = match timeout(self.write_timeout, sink.store_record(record)).await {
                Ok(result) => result,
                Err(_) => Err(SinkError::Timeout(self.write_timeout)),
            };

            match result {
                Ok(()) => {
                    tracing::debug!(
                        sink = sink.name(),
                        measurement = %record.measurement,
                        "Record stored"
                    );
                }
                // Sinks log their own failures; only a timeout is news here.
                Err(err @ SinkError::Timeout(_)) => {
                    tracing::warn!(
                        sink = sink.name(),
                        measurement = %record.measurement,
                        error = %err,
                        "Sink write timed out"
                    );
                }
                Err(err) => {
                    tracing::debug!(
                        sink = sink.name(),
                        measurement = %record.measurement,
                        error = %err,
                        "Record not stored"
                    );
                }
            }
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(DEFAULT_WRITE_TIMEOUT)
    }
}
