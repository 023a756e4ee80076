use crate::document::Document;
use crate::output::traits::{DocumentSink, SinkResult};
use async_trait::async_trait;
use std::sync::{Mutex, PoisonError};

/// Collects documents in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    documents: Mutex<Vec<Document>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Takes every document collected so far
    pub fn take(&self) -> Vec<Document> {
        std::mem::take(&mut *self.lock())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Document>> {
        self.documents.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl DocumentSink for MemorySink {
    async fn accept(&self, document: Document) -> SinkResult<()> {
        self.lock().push(document);
        Ok(())
    }
}
