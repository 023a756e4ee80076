//! JSON Lines sink
//!
//! Writes one serialized [`Document`] per line to any `AsyncWrite`:
//! stdout, a file, or an in-memory buffer.

use crate::document::Document;
use crate::output::traits::{DocumentSink, SinkResult};
use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

#[derive(Debug)]
pub struct JsonLinesSink<W> {
    writer: Mutex<W>,
}

impl<W> JsonLinesSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

#[async_trait]
impl<W> DocumentSink for JsonLinesSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn accept(&self, document: Document) -> SinkResult<()> {
        let mut line = serde_json::to_vec(&document)?;
        line.push(b'\n');

        let mut writer = self.writer.lock().await;
        writer.write_all(&line).await?;
        Ok(())
    }

    async fn flush(&self) -> SinkResult<()> {
        self.writer.lock().await.flush().await?;
        Ok(())
    }
}
