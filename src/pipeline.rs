//! Document processing orchestrator.
//!
//! Owns the `pending -> processing -> {completed | failed}` lifecycle.
//! All processing for one document runs through that document's async
//! mutex, so status and chunk mutation never race; different documents
//! process concurrently in background tasks. The embedding store is
//! initialized lazily, and a store that is not ready degrades the
//! system (documents stay pending) instead of failing it.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::cache::content_hash;
use crate::chunker::Chunker;
use crate::config::{ChunkerConfig, PipelineConfig};
use crate::document::{Document, DocumentStore, ProcessingStatus};
use crate::errors::RagError;
use crate::markup::strip_markup;
use crate::store::EmbeddingStore;
use crate::tasks::TaskRegistry;

enum RunOutcome {
    Completed,
    Cancelled,
}

#[derive(Clone)]
pub struct PipelineOrchestrator {
    documents: Arc<dyn DocumentStore>,
    store: Arc<dyn EmbeddingStore>,
    tasks: TaskRegistry,
    chunker: Arc<Chunker>,
    config: PipelineConfig,
    doc_locks: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
    /// Ids with a sweep-spawned run that has not finished yet. Covers
    /// the gap between spawning a run and that run flipping the
    /// document to `Processing`.
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl PipelineOrchestrator {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        store: Arc<dyn EmbeddingStore>,
        tasks: TaskRegistry,
        chunker_config: ChunkerConfig,
        config: PipelineConfig,
    ) -> Self {
        Self {
            documents,
            store,
            tasks,
            chunker: Arc::new(Chunker::new(chunker_config)),
            config,
            doc_locks: Arc::new(Mutex::new(HashMap::new())),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.store.is_ready()
    }

    /// Lazily initialize the embedding store. Returns readiness;
    /// initialization failure is degradation, not an error.
    pub async fn ensure_ready(&self) -> bool {
        if self.store.is_ready() {
            return true;
        }
        match self.store.initialize().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "embedding store initialization failed; search disabled");
                false
            }
        }
    }

    /// Bounded readiness poll. Continued non-readiness means degraded
    /// mode (processing and search stay disabled), never a crash.
    pub async fn wait_until_ready(&self) -> bool {
        for attempt in 0..self.config.readiness_attempts {
            if self.ensure_ready().await {
                return true;
            }
            if attempt + 1 < self.config.readiness_attempts {
                tokio::time::sleep(Duration::from_millis(self.config.readiness_interval_ms)).await;
            }
        }
        tracing::warn!(
            attempts = self.config.readiness_attempts,
            "embedding store never became ready; running degraded"
        );
        false
    }

    /// Process one document end to end under its confinement lock.
    ///
    /// Cancellation is cooperative: it is checked at the chunk loop
    /// and around the embedding call, exits without mutating status,
    /// and is not an error. Embedding failures mark the document
    /// `Failed` and leave it retriable. Returns `Err` only when the
    /// persistence layer itself misbehaves.
    pub async fn process_document(
        &self,
        id: &str,
        token: CancellationToken,
    ) -> Result<(), RagError> {
        let lock = self.doc_lock(id);
        let _guard = lock.lock().await;

        if token.is_cancelled() {
            return Ok(());
        }

        let Some(doc) = self.documents.get(id).await? else {
            return Err(RagError::Internal(format!("unknown document: {id}")));
        };

        // Someone else already owns an in-flight run for this id.
        if doc.status == ProcessingStatus::Processing {
            return Ok(());
        }

        if !self.ensure_ready().await {
            tracing::debug!(document = id, "store not ready, leaving document pending");
            return Ok(());
        }

        let prior_status = doc.status;
        self.documents
            .set_status(id, ProcessingStatus::Processing)
            .await?;
        self.tasks.add(id, &doc.title, 4);

        let result = self.execute(&doc, &token).await;
        self.tasks.remove(id);

        match result {
            Ok(RunOutcome::Completed) => Ok(()),
            Ok(RunOutcome::Cancelled) => {
                // Leave the document as it was before the run so a
                // later sweep or edit can retry it.
                self.documents.set_status(id, prior_status).await?;
                Ok(())
            }
            Err(e) => {
                tracing::warn!(document = id, error = %e, "document processing failed");
                self.documents
                    .set_status(id, ProcessingStatus::Failed)
                    .await?;
                Ok(())
            }
        }
    }

    async fn execute(
        &self,
        doc: &Document,
        token: &CancellationToken,
    ) -> Result<RunOutcome, RagError> {
        let id = doc.id.as_str();

        self.tasks.update(id, 1, "loading content");
        let content = self.documents.load_content(id).await?;
        let plain = strip_markup(&content);

        self.tasks.update(id, 2, "chunking");
        let mut chunks = self.chunker.chunk(&plain, id);

        if chunks.is_empty() {
            // An empty document is valid: nothing to index.
            self.documents.set_embedding_ids(id, Vec::new()).await?;
            self.documents
                .set_content_hash(id, &content_hash(&content))
                .await?;
            self.documents
                .set_status(id, ProcessingStatus::Completed)
                .await?;
            tracing::debug!(document = id, "empty document marked completed");
            return Ok(RunOutcome::Completed);
        }

        let mut texts = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            if token.is_cancelled() {
                return Ok(RunOutcome::Cancelled);
            }
            texts.push(chunk.content.clone());
        }

        // Vectors from the previous run are stale now.
        if !doc.embedding_ids.is_empty() {
            self.store.delete_documents(&doc.embedding_ids).await?;
        }

        if token.is_cancelled() {
            return Ok(RunOutcome::Cancelled);
        }

        self.tasks.update(id, 3, "embedding chunks");
        let ids = self.store.add_documents(&texts).await?;

        if token.is_cancelled() {
            // The batch landed but the run must not commit; drop the
            // vectors so a retry starts clean.
            let _ = self.store.delete_documents(&ids).await;
            return Ok(RunOutcome::Cancelled);
        }

        for (chunk, embedding_id) in chunks.iter_mut().zip(&ids) {
            chunk.embedding_id = Some(embedding_id.clone());
        }

        self.tasks.update(id, 4, "finalizing");
        self.documents.set_embedding_ids(id, ids).await?;
        self.documents
            .set_content_hash(id, &content_hash(&content))
            .await?;
        self.documents
            .set_status(id, ProcessingStatus::Completed)
            .await?;

        tracing::info!(document = id, chunks = chunks.len(), "document processed");
        Ok(RunOutcome::Completed)
    }

    /// Enqueue a background run for every pending document.
    ///
    /// Dedup is by status plus the in-flight set: documents already
    /// `Processing` or already enqueued by an earlier sweep are
    /// skipped, everything else is left alone, so repeated sweeps
    /// enqueue zero extra work. Returns the number of runs enqueued;
    /// completion order across documents is undefined.
    pub async fn process_all_pending(&self) -> Result<usize, RagError> {
        let docs = self.documents.list().await?;
        let mut enqueued = 0;

        for doc in docs {
            if doc.status != ProcessingStatus::Pending {
                continue;
            }
            {
                let mut in_flight = self.in_flight.lock().expect("in-flight set poisoned");
                if !in_flight.insert(doc.id.clone()) {
                    continue;
                }
            }

            let this = self.clone();
            let id = doc.id.clone();
            tokio::spawn(async move {
                if let Err(e) = this.process_document(&id, CancellationToken::new()).await {
                    tracing::warn!(document = %id, error = %e, "background processing error");
                }
                this.in_flight
                    .lock()
                    .expect("in-flight set poisoned")
                    .remove(&id);
            });
            enqueued += 1;
        }

        if enqueued > 0 {
            tracing::info!(count = enqueued, "pending sweep enqueued documents");
        }
        Ok(enqueued)
    }

    /// Read-only task progress for a UI layer to poll.
    pub fn task_snapshot(&self) -> Vec<crate::tasks::ProcessingTask> {
        self.tasks.snapshot()
    }

    fn doc_lock(&self, id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut guard = self.doc_locks.lock().expect("doc lock map poisoned");
        guard
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}
