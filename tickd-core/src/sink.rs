//! Durable event sink contract.

use async_trait::async_trait;
use thiserror::Error;
use tickd_types::Event;

/// Errors a sink may surface. The pipeline retries `Retryable` writes with
/// bounded exponential backoff; `Terminal` errors are reported in-band as
/// integrity events and via `flush()`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// Transient condition; the same batch may succeed shortly.
    #[error("retryable sink error: {0}")]
    Retryable(String),
    /// Unrecoverable condition; subsequent writes will fail too.
    #[error("terminal sink error: {0}")]
    Terminal(String),
}

impl SinkError {
    /// Whether retrying the write is worthwhile.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }
}

/// Durable write target for event batches.
///
/// The sink is written only by the pipeline's single consumer task; batch
/// order must be preserved and never reordered. `close` releases all
/// buffered resources.
#[async_trait]
pub trait EventSink: Send {
    /// Append a batch. The batch is an ordered sequence of events.
    async fn write(&mut self, batch: &[Event]) -> Result<(), SinkError>;

    /// Make all previously written events durable.
    async fn flush(&mut self) -> Result<(), SinkError>;

    /// Flush and release the sink.
    async fn close(&mut self) -> Result<(), SinkError>;
}

/// Sink that discards everything. Useful in tests and as a mirror default.
#[derive(Debug, Default)]
pub struct NullSink;

#[async_trait]
impl EventSink for NullSink {
    async fn write(&mut self, _batch: &[Event]) -> Result<(), SinkError> {
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}
