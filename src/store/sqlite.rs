//! SQLite-backed embedding store.
//!
//! Chunk text and serialized vectors live in one SQLite database;
//! search is brute-force cosine over the collection, which holds up
//! fine at personal-notes scale. The embedding model identity is
//! recorded in a meta table because vectors from different models are
//! not comparable.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use tokio::sync::OnceCell;

use super::{cosine_similarity, EmbeddingStore, SearchResult};
use crate::config::AppPaths;
use crate::embedder::Embedder;
use crate::errors::RagError;

pub struct SqliteEmbeddingStore {
    embedder: Arc<dyn Embedder>,
    db_path: PathBuf,
    pool: OnceCell<SqlitePool>,
    ready: AtomicBool,
}

impl SqliteEmbeddingStore {
    pub fn new(paths: &AppPaths, embedder: Arc<dyn Embedder>) -> Self {
        Self::with_path(paths.embedding_db_path.clone(), embedder)
    }

    pub fn with_path(db_path: PathBuf, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            db_path,
            pool: OnceCell::new(),
            ready: AtomicBool::new(false),
        }
    }

    async fn connect(db_path: &PathBuf) -> Result<SqlitePool, RagError> {
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(RagError::internal)?;

        Ok(pool)
    }

    async fn init_schema(pool: &SqlitePool) -> Result<(), RagError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS embeddings (
                id TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                embedding BLOB NOT NULL,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(pool)
        .await
        .map_err(RagError::internal)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS embedding_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(pool)
        .await
        .map_err(RagError::internal)?;

        Ok(())
    }

    fn pool(&self) -> Result<&SqlitePool, RagError> {
        if !self.is_ready() {
            return Err(RagError::NotInitialized);
        }
        self.pool.get().ok_or(RagError::NotInitialized)
    }

    fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    /// Model id recorded at last initialize, if any.
    pub async fn stored_model(&self) -> Result<Option<String>, RagError> {
        let pool = self.pool()?;
        sqlx::query_scalar("SELECT value FROM embedding_meta WHERE key = 'embedding_model'")
            .fetch_optional(pool)
            .await
            .map_err(RagError::internal)
    }
}

#[async_trait]
impl EmbeddingStore for SqliteEmbeddingStore {
    async fn initialize(&self) -> Result<(), RagError> {
        if self.is_ready() {
            return Ok(());
        }

        let pool = self
            .pool
            .get_or_try_init(|| Self::connect(&self.db_path))
            .await?;
        Self::init_schema(pool).await?;

        sqlx::query(
            "INSERT OR REPLACE INTO embedding_meta (key, value, updated_at)
             VALUES ('embedding_model', ?1, STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))",
        )
        .bind(self.embedder.model_id())
        .execute(pool)
        .await
        .map_err(RagError::internal)?;

        self.ready.store(true, Ordering::SeqCst);
        tracing::info!(
            model = self.embedder.model_id(),
            path = %self.db_path.display(),
            "embedding store initialized"
        );
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn add_documents(&self, texts: &[String]) -> Result<Vec<String>, RagError> {
        let pool = self.pool()?;
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

        // One transaction per batch keeps partial failure invisible.
        let mut tx = pool.begin().await.map_err(RagError::internal)?;
        let mut ids = Vec::with_capacity(texts.len());

        for (text, vector) in texts.iter().zip(&vectors) {
            let id = uuid::Uuid::new_v4().to_string();
            let blob = Self::serialize_embedding(vector);

            sqlx::query("INSERT INTO embeddings (id, content, embedding) VALUES (?1, ?2, ?3)")
                .bind(&id)
                .bind(text)
                .bind(&blob)
                .execute(&mut *tx)
                .await
                .map_err(RagError::internal)?;

            ids.push(id);
        }

        tx.commit().await.map_err(RagError::internal)?;
        tracing::debug!(count = ids.len(), "stored embedding batch");
        Ok(ids)
    }

    async fn search(
        &self,
        query: &str,
        num_results: usize,
        threshold: f32,
    ) -> Result<Vec<SearchResult>, RagError> {
        let pool = self.pool()?;

        let query_vec = self
            .embedder
            .embed(std::slice::from_ref(&query.to_string()))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RagError::EmbeddingFailed("empty query embedding".into()))?;

        let rows = sqlx::query("SELECT id, content, embedding FROM embeddings")
            .fetch_all(pool)
            .await
            .map_err(RagError::internal)?;

        let mut scored: Vec<SearchResult> = rows
            .iter()
            .filter_map(|row| {
                let embedding_bytes: Vec<u8> = row.get("embedding");
                if embedding_bytes.is_empty() {
                    return None;
                }
                let stored = Self::deserialize_embedding(&embedding_bytes);
                let score = cosine_similarity(&query_vec, &stored);
                if score < threshold {
                    return None;
                }
                Some(SearchResult {
                    id: row.get("id"),
                    content: row.get("content"),
                    score,
                })
            })
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
        let pool = self.pool()?;
        if ids.is_empty() {
            return Ok(());
        }

        let mut tx = pool.begin().await.map_err(RagError::internal)?;
        for id in ids {
            sqlx::query("DELETE FROM embeddings WHERE id = ?1")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(RagError::internal)?;
        }
        tx.commit().await.map_err(RagError::internal)?;
        Ok(())
    }

    async fn reset(&self) -> Result<(), RagError> {
        let pool = self.pool()?;
        sqlx::query("DELETE FROM embeddings")
            .execute(pool)
            .await
            .map_err(RagError::internal)?;
        tracing::info!("embedding store reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubEmbedder;

    #[async_trait]
    impl Embedder for StubEmbedder {
        fn model_id(&self) -> &str {
            "stub-embed"
        }

        fn dimension(&self) -> usize {
            3
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
            Ok(texts
                .iter()
                .map(|t| {
                    if t.contains("cat") {
                        vec![1.0, 0.0, 0.0]
                    } else if t.contains("dog") {
                        vec![0.8, 0.6, 0.0]
                    } else {
                        vec![0.0, 0.0, 1.0]
                    }
                })
                .collect())
        }
    }

    fn test_store(dir: &tempfile::TempDir) -> SqliteEmbeddingStore {
        SqliteEmbeddingStore::with_path(dir.path().join("embeddings.db"), Arc::new(StubEmbedder))
    }

    #[tokio::test]
    async fn operations_before_initialize_fail_fast() {
        let tmp = tempfile::tempdir().unwrap();
        let store = test_store(&tmp);

        assert!(matches!(
            store.add_documents(&["x".into()]).await,
            Err(RagError::NotInitialized)
        ));
        assert!(matches!(
            store.search("x", 5, 0.5).await,
            Err(RagError::NotInitialized)
        ));
        assert!(matches!(store.reset().await, Err(RagError::NotInitialized)));
    }

    #[tokio::test]
    async fn initialize_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let store = test_store(&tmp);

        store.initialize().await.unwrap();
        store.initialize().await.unwrap();
        assert!(store.is_ready());
        assert_eq!(
            store.stored_model().await.unwrap().as_deref(),
            Some("stub-embed")
        );
    }

    #[tokio::test]
    async fn add_search_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let store = test_store(&tmp);
        store.initialize().await.unwrap();

        let ids = store
            .add_documents(&["the cat sat".into(), "a dog ran".into(), "weather".into()])
            .await
            .unwrap();
        assert_eq!(ids.len(), 3);

        let results = store.search("cat", 10, 0.7).await.unwrap();
        assert!(!results.is_empty());
        assert_eq!(results[0].id, ids[0]);
        assert_eq!(results[0].content, "the cat sat");
        for result in &results {
            assert!(result.score >= 0.7);
        }

        let limited = store.search("cat", 1, 0.0).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn high_threshold_returns_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let store = test_store(&tmp);
        store.initialize().await.unwrap();
        store
            .add_documents(&["the cat sat".into(), "a dog ran".into()])
            .await
            .unwrap();

        // Query lands on an axis orthogonal to everything stored.
        let results = store.search("weather", 10, 0.99).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn delete_and_reset() {
        let tmp = tempfile::tempdir().unwrap();
        let store = test_store(&tmp);
        store.initialize().await.unwrap();

        let ids = store
            .add_documents(&["cat a".into(), "cat b".into()])
            .await
            .unwrap();

        store.delete_documents(&ids[..1]).await.unwrap();
        let remaining = store.search("cat", 10, 0.0).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, ids[1]);

        store.reset().await.unwrap();
        assert!(store.search("cat", 10, 0.0).await.unwrap().is_empty());
    }
}
