//! Document lifecycle types and the persistence boundary.
//!
//! Documents are owned by the host's persistence layer; this core only
//! mutates their processing fields through the `DocumentStore` trait.
//! Chunks are ephemeral per processing run and are never diffed
//! against a previous run.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::RagError;

/// Per-document processing state. Replaced monotonically by the
/// orchestrator; external edits reset it to `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    /// Digest of the content this document was last processed with.
    pub content_hash: String,
    pub status: ProcessingStatus,
    pub is_processed: bool,
    /// Ids of the embedding entries produced by the last completed run.
    pub embedding_ids: Vec<String>,
}

/// A bounded, sentence-aligned slice of a document's plain text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub document_id: String,
    pub index: usize,
    pub content: String,
    /// Character offset of the first fresh (non-overlap) character.
    pub start_offset: usize,
    /// Character offset one past the last character covered.
    pub end_offset: usize,
    /// Set after the write path completes, in input order.
    pub embedding_id: Option<String>,
}

/// The external persistence layer, seen from this core.
///
/// The orchestrator is the only writer of the processing fields; hosts
/// own everything else about a document.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn load_content(&self, id: &str) -> Result<String, RagError>;
    async fn get(&self, id: &str) -> Result<Option<Document>, RagError>;
    async fn list(&self) -> Result<Vec<Document>, RagError>;
    async fn set_status(&self, id: &str, status: ProcessingStatus) -> Result<(), RagError>;
    async fn set_embedding_ids(&self, id: &str, ids: Vec<String>) -> Result<(), RagError>;
    async fn set_content_hash(&self, id: &str, hash: &str) -> Result<(), RagError>;
}

/// In-memory `DocumentStore` for tests and for hosts that keep
/// document metadata elsewhere.
#[derive(Clone, Default)]
pub struct InMemoryDocumentStore {
    inner: Arc<Mutex<HashMap<String, (Document, String)>>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a document with its content; new documents start pending.
    pub fn insert(&self, id: &str, title: &str, content: &str) {
        let doc = Document {
            id: id.to_string(),
            title: title.to_string(),
            content_hash: String::new(),
            status: ProcessingStatus::Pending,
            is_processed: false,
            embedding_ids: Vec::new(),
        };
        self.inner
            .lock()
            .expect("document store lock poisoned")
            .insert(id.to_string(), (doc, content.to_string()));
    }

    /// Replace a document's content, resetting it to pending.
    pub fn set_content(&self, id: &str, content: &str) {
        let mut guard = self.inner.lock().expect("document store lock poisoned");
        if let Some((doc, stored)) = guard.get_mut(id) {
            *stored = content.to_string();
            doc.status = ProcessingStatus::Pending;
            doc.is_processed = false;
        }
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn load_content(&self, id: &str) -> Result<String, RagError> {
        let guard = self.inner.lock().map_err(RagError::internal)?;
        guard
            .get(id)
            .map(|(_, content)| content.clone())
            .ok_or_else(|| RagError::Internal(format!("unknown document: {id}")))
    }

    async fn get(&self, id: &str) -> Result<Option<Document>, RagError> {
        let guard = self.inner.lock().map_err(RagError::internal)?;
        Ok(guard.get(id).map(|(doc, _)| doc.clone()))
    }

    async fn list(&self) -> Result<Vec<Document>, RagError> {
        let guard = self.inner.lock().map_err(RagError::internal)?;
        Ok(guard.values().map(|(doc, _)| doc.clone()).collect())
    }

    async fn set_status(&self, id: &str, status: ProcessingStatus) -> Result<(), RagError> {
        let mut guard = self.inner.lock().map_err(RagError::internal)?;
        let (doc, _) = guard
            .get_mut(id)
            .ok_or_else(|| RagError::Internal(format!("unknown document: {id}")))?;
        doc.status = status;
        doc.is_processed = status == ProcessingStatus::Completed;
        Ok(())
    }

    async fn set_embedding_ids(&self, id: &str, ids: Vec<String>) -> Result<(), RagError> {
        let mut guard = self.inner.lock().map_err(RagError::internal)?;
        let (doc, _) = guard
            .get_mut(id)
            .ok_or_else(|| RagError::Internal(format!("unknown document: {id}")))?;
        doc.embedding_ids = ids;
        Ok(())
    }

    async fn set_content_hash(&self, id: &str, hash: &str) -> Result<(), RagError> {
        let mut guard = self.inner.lock().map_err(RagError::internal)?;
        let (doc, _) = guard
            .get_mut(id)
            .ok_or_else(|| RagError::Internal(format!("unknown document: {id}")))?;
        doc.content_hash = hash.to_string();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn status_drives_is_processed() {
        let store = InMemoryDocumentStore::new();
        store.insert("d1", "Doc", "hello");

        store
            .set_status("d1", ProcessingStatus::Completed)
            .await
            .unwrap();
        let doc = store.get("d1").await.unwrap().unwrap();
        assert!(doc.is_processed);

        store
            .set_status("d1", ProcessingStatus::Pending)
            .await
            .unwrap();
        let doc = store.get("d1").await.unwrap().unwrap();
        assert!(!doc.is_processed);
    }

    #[tokio::test]
    async fn edit_resets_to_pending() {
        let store = InMemoryDocumentStore::new();
        store.insert("d1", "Doc", "v1");
        store
            .set_status("d1", ProcessingStatus::Completed)
            .await
            .unwrap();

        store.set_content("d1", "v2");
        let doc = store.get("d1").await.unwrap().unwrap();
        assert_eq!(doc.status, ProcessingStatus::Pending);
        assert_eq!(store.load_content("d1").await.unwrap(), "v2");
    }
}
