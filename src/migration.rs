//! Embedding backend migration.
//!
//! When the vector backend or embedding model changes, existing
//! vectors live in an incompatible space and must never be reused.
//! The coordinator detects the previous backend's storage artifact,
//! marks every previously-processed document pending so the normal
//! pipeline re-chunks and re-embeds it, and cleans up the old
//! storage. "Migrated" means handed off to normal processing, not
//! fully re-embedded, so an interrupted migration is picked up by the
//! next ordinary sweep.

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use crate::config::AppPaths;
use crate::document::{DocumentStore, ProcessingStatus};
use crate::errors::RagError;
use crate::pipeline::PipelineOrchestrator;
use crate::settings::SettingsStore;

const MIGRATION_FLAG: &str = "embedding_migration_completed";

pub struct MigrationCoordinator {
    paths: AppPaths,
    settings: SettingsStore,
    documents: Arc<dyn DocumentStore>,
    pipeline: PipelineOrchestrator,
    /// Delay before the legacy artifact is removed, giving in-flight
    /// readers of the old storage time to drain.
    grace_delay: Duration,
}

impl MigrationCoordinator {
    pub fn new(
        paths: AppPaths,
        settings: SettingsStore,
        documents: Arc<dyn DocumentStore>,
        pipeline: PipelineOrchestrator,
    ) -> Self {
        Self {
            paths,
            settings,
            documents,
            pipeline,
            grace_delay: Duration::from_secs(5),
        }
    }

    pub fn with_grace_delay(mut self, grace_delay: Duration) -> Self {
        self.grace_delay = grace_delay;
        self
    }

    /// Run the migration if it is needed. Returns whether documents
    /// were handed off for re-processing. Idempotent: the persisted
    /// completion flag short-circuits every later call, which then
    /// only retries artifact cleanup if an earlier run was
    /// interrupted before removing it.
    pub async fn run(&self) -> Result<bool, RagError> {
        let legacy = &self.paths.legacy_store_path;

        if self.settings.get_bool(MIGRATION_FLAG) {
            if legacy.exists() {
                tracing::info!(
                    artifact = %legacy.display(),
                    "resuming interrupted legacy storage cleanup"
                );
                remove_artifact(legacy);
            } else {
                tracing::debug!("embedding migration already completed");
            }
            return Ok(false);
        }

        if !legacy.exists() {
            // Fresh install or already cleaned up: nothing to migrate.
            self.settings.set_bool(MIGRATION_FLAG, true)?;
            return Ok(false);
        }

        tracing::info!(
            artifact = %legacy.display(),
            "legacy vector storage detected, re-queueing processed documents"
        );

        let mut requeued = 0usize;
        for doc in self.documents.list().await? {
            if !doc.is_processed && doc.status != ProcessingStatus::Failed {
                continue;
            }
            // Old vectors are unusable in the new space.
            self.documents
                .set_embedding_ids(&doc.id, Vec::new())
                .await?;
            self.documents
                .set_status(&doc.id, ProcessingStatus::Pending)
                .await?;
            requeued += 1;
        }

        self.pipeline.process_all_pending().await?;

        // Done means handed off; the flag must not wait for every
        // document to finish re-embedding.
        self.settings.set_bool(MIGRATION_FLAG, true)?;

        tokio::time::sleep(self.grace_delay).await;
        remove_artifact(legacy);

        tracing::info!(requeued, "embedding migration handed off");
        Ok(true)
    }
}

fn remove_artifact(path: &std::path::Path) {
    let result = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    if let Err(e) = result {
        // Leaving the artifact behind re-triggers cleanup next start.
        tracing::warn!(path = %path.display(), error = %e, "failed to remove legacy storage");
    }
}
