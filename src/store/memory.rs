//! In-memory embedding store backend.
//!
//! Brute-force cosine search over a mutex-guarded vector. This was
//! the original engine before the SQLite backend landed; it remains
//! the fallback and the backend of choice for tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{cosine_similarity, EmbeddingStore, SearchResult};
use crate::embedder::Embedder;
use crate::errors::RagError;

struct Entry {
    id: String,
    content: String,
    vector: Vec<f32>,
}

pub struct InMemoryEmbeddingStore {
    embedder: Arc<dyn Embedder>,
    entries: Mutex<Vec<Entry>>,
    ready: AtomicBool,
}

impl InMemoryEmbeddingStore {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            entries: Mutex::new(Vec::new()),
            ready: AtomicBool::new(false),
        }
    }

    fn entries(&self) -> Result<std::sync::MutexGuard<'_, Vec<Entry>>, RagError> {
        if !self.is_ready() {
            return Err(RagError::NotInitialized);
        }
        self.entries.lock().map_err(RagError::internal)
    }
}

#[async_trait]
impl EmbeddingStore for InMemoryEmbeddingStore {
    async fn initialize(&self) -> Result<(), RagError> {
        self.ready.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn add_documents(&self, texts: &[String]) -> Result<Vec<String>, RagError> {
        if !self.is_ready() {
            return Err(RagError::NotInitialized);
        }
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let vectors = self.embedder.embed(texts).await?;
        if vectors.len() != texts.len() {
            return Err(RagError::EmbeddingFailed(format!(
                "expected {} vectors, got {}",
                texts.len(),
                vectors.len()
            )));
        }

        let mut guard = self.entries.lock().map_err(RagError::internal)?;
        let mut ids = Vec::with_capacity(texts.len());
        for (text, vector) in texts.iter().zip(vectors) {
            let id = uuid::Uuid::new_v4().to_string();
            guard.push(Entry {
                id: id.clone(),
                content: text.clone(),
                vector,
            });
            ids.push(id);
        }
        Ok(ids)
    }

    async fn search(
        &self,
        query: &str,
        num_results: usize,
        threshold: f32,
    ) -> Result<Vec<SearchResult>, RagError> {
        if !self.is_ready() {
            return Err(RagError::NotInitialized);
        }

        let query_vec = self
            .embedder
            .embed(std::slice::from_ref(&query.to_string()))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RagError::EmbeddingFailed("empty query embedding".into()))?;

        let guard = self.entries.lock().map_err(RagError::internal)?;
        let mut scored: Vec<SearchResult> = guard
            .iter()
            .map(|entry| SearchResult {
                id: entry.id.clone(),
                content: entry.content.clone(),
                score: cosine_similarity(&query_vec, &entry.vector),
            })
            .filter(|result| result.score >= threshold)
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(num_results);
        Ok(scored)
    }

    async fn delete_documents(&self, ids: &[String]) -> Result<(), RagError> {
        let mut guard = self.entries()?;
        guard.retain(|entry| !ids.contains(&entry.id));
        Ok(())
    }

    async fn reset(&self) -> Result<(), RagError> {
        let mut guard = self.entries()?;
        guard.clear();
        Ok(())
    }
}
