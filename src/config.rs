//! Application paths and tunable policy.
//!
//! `AppPaths` owns the on-disk layout (embedding database, legacy
//! artifacts, settings, logs). Policy knobs live in plain config
//! structs with `Default` impls so hosts can persist or override them.

use std::env;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub user_data_dir: PathBuf,
    pub log_dir: PathBuf,
    /// SQLite database backing the embedding store.
    pub embedding_db_path: PathBuf,
    /// Storage artifact left behind by the previous vector backend.
    /// Its presence is what triggers the embedding migration.
    pub legacy_store_path: PathBuf,
    /// JSON key-value settings file (migration flag and friends).
    pub settings_path: PathBuf,
}

impl AppPaths {
    pub fn new() -> Self {
        Self::with_data_dir(discover_user_data_dir())
    }

    /// Build the layout under an explicit data directory (used by tests).
    pub fn with_data_dir(user_data_dir: PathBuf) -> Self {
        let log_dir = user_data_dir.join("logs");
        let embedding_db_path = user_data_dir.join("embeddings.db");
        let legacy_store_path = user_data_dir.join("vector_store_v1");
        let settings_path = user_data_dir.join("settings.json");

        for dir in [&user_data_dir, &log_dir] {
            let _ = fs::create_dir_all(dir);
        }

        AppPaths {
            user_data_dir,
            log_dir,
            embedding_db_path,
            legacy_store_path,
            settings_path,
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

fn discover_user_data_dir() -> PathBuf {
    if let Ok(dir) = env::var("FOLIO_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if cfg!(target_os = "windows") {
        let base = env::var("LOCALAPPDATA")
            .unwrap_or_else(|_| env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string()));
        return PathBuf::from(base).join("Folio");
    }

    if cfg!(target_os = "macos") {
        if let Ok(home) = env::var("HOME") {
            return PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("Folio");
        }
    }

    if let Ok(home) = env::var("HOME") {
        return PathBuf::from(home).join(".local").join("share").join("folio");
    }

    env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

/// Chunking policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkerConfig {
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Character budget for the word-window overlap carried between chunks.
    pub overlap_size: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            overlap_size: 50,
        }
    }
}

/// Render/transform cache policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Entry count that triggers eviction.
    pub capacity: usize,
    /// Entries evicted per pass, oldest access first.
    pub evict_batch: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            evict_batch: 10,
        }
    }
}

/// Orchestrator policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Bounded readiness poll: attempts before giving up.
    pub readiness_attempts: u32,
    /// Interval between readiness polls, in milliseconds.
    pub readiness_interval_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            readiness_attempts: 30,
            readiness_interval_ms: 1000,
        }
    }
}

/// Retrieval and context assembly policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Nearest neighbours requested per query.
    pub num_results: usize,
    /// Minimum similarity score for a result to count.
    pub similarity_threshold: f32,
    /// Result counts up to this go through direct assembly; above it,
    /// hierarchical summarization.
    pub direct_assembly_max: usize,
    /// Per-excerpt character budget inside an assembled context.
    pub excerpt_budget: usize,
    /// Absolute ceiling for the assembled context, in characters.
    pub context_ceiling: usize,
    /// Results per summarization batch on the hierarchical path.
    pub summary_batch_size: usize,
    /// Upper bound on the final prompt accepted by the generator.
    pub max_prompt_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            num_results: 10,
            similarity_threshold: 0.7,
            direct_assembly_max: 5,
            excerpt_budget: 800,
            context_ceiling: 2400,
            summary_batch_size: 3,
            max_prompt_chars: 6000,
        }
    }
}
