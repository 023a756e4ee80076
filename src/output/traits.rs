//! Sink trait and errors
//!
//! A sink consumes the document stream of a run. Sinks may apply
//! backpressure: the engine does not pull more work than the sink accepts.

use crate::document::Document;
use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur while delivering documents
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize document: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Result type for sink operations
pub type SinkResult<T> = Result<T, SinkError>;

/// Consumer of the document stream
#[async_trait]
pub trait DocumentSink: Send + Sync {
    /// Accepts one document
    async fn accept(&self, document: Document) -> SinkResult<()>;

    /// Flushes buffered output; called once the stream has ended
    async fn flush(&self) -> SinkResult<()> {
        Ok(())
    }
}
