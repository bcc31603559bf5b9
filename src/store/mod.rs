//! Embedding store abstraction.
//!
//! A model-aware collection of (id, text, vector) entries behind a
//! backend-agnostic trait. The project has already migrated between
//! two incompatible vector engines once, so nothing outside a backend
//! module may assume a backend's id format or schema.

mod memory;
mod sqlite;

pub use memory::InMemoryEmbeddingStore;
pub use sqlite::SqliteEmbeddingStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::RagError;

/// One nearest-neighbour match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    pub content: String,
    /// Cosine similarity against the query, in [-1, 1].
    pub score: f32,
}

/// Backend-agnostic embedding store contract.
///
/// `initialize` gates everything: any other operation called before a
/// successful `initialize` fails fast with `RagError::NotInitialized`
/// instead of blocking or silently doing nothing.
#[async_trait]
pub trait EmbeddingStore: Send + Sync {
    /// Connect the embedding model and open persistent storage.
    /// Idempotent and safe to retry; failure leaves the store unready
    /// but usable for another attempt.
    async fn initialize(&self) -> Result<(), RagError>;

    fn is_ready(&self) -> bool;

    /// Embed and store `texts` as one batch; returns one generated id
    /// per input, in input order. All-or-nothing.
    async fn add_documents(&self, texts: &[String]) -> Result<Vec<String>, RagError>;

    /// Embed `query` internally and return up to `num_results` entries
    /// with similarity >= `threshold`, best first. Empty is a valid
    /// answer, not an error.
    async fn search(
        &self,
        query: &str,
        num_results: usize,
        threshold: f32,
    ) -> Result<Vec<SearchResult>, RagError>;

    async fn delete_documents(&self, ids: &[String]) -> Result<(), RagError>;

    /// Drop the entire collection.
    async fn reset(&self) -> Result<(), RagError>;
}

/// Cosine similarity, the scoring contract every backend reports in.
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    let denom = norm_a * norm_b;

    if denom <= f32::EPSILON {
        0.0
    } else {
        dot / denom
    }
}
