//! Hash-keyed cache for expensive derived artifacts.
//!
//! Holds formatted previews and AI transformations keyed by artifact
//! id. An entry is valid only while its stored content hash matches
//! the hash of the current source text; presence alone is never
//! trusted. Losing the cache loses performance, not correctness.

use std::collections::HashMap;
use std::sync::Mutex;

use sha2::{Digest, Sha256};

use crate::config::CacheConfig;

/// Deterministic digest of `text`, used for staleness checks.
pub fn content_hash(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

struct CacheEntry {
    artifact: String,
    hash: String,
    last_access: u64,
}

struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    /// Logical clock; bumped on every access so eviction can order
    /// entries without wall-clock reads.
    clock: u64,
}

pub struct RenderCache {
    inner: Mutex<CacheInner>,
    config: CacheConfig,
}

impl RenderCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                clock: 0,
            }),
            config,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(CacheConfig::default())
    }

    /// Fetch `key` if present and still valid for `expected_hash`.
    ///
    /// A hash mismatch is a miss and evicts the stale entry, so a
    /// later `put` starts clean.
    pub fn get(&self, key: &str, expected_hash: &str) -> Option<String> {
        let mut inner = self.inner.lock().expect("render cache lock poisoned");
        inner.clock += 1;
        let clock = inner.clock;

        match inner.entries.get_mut(key) {
            Some(entry) if entry.hash == expected_hash => {
                entry.last_access = clock;
                Some(entry.artifact.clone())
            }
            Some(_) => {
                inner.entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, key: &str, artifact: String, hash: String) {
        let mut inner = self.inner.lock().expect("render cache lock poisoned");
        inner.clock += 1;
        let clock = inner.clock;
        inner.entries.insert(
            key.to_string(),
            CacheEntry {
                artifact,
                hash,
                last_access: clock,
            },
        );

        if inner.entries.len() > self.config.capacity {
            let evict_batch = self.config.evict_batch.max(1);
            let mut by_age: Vec<(String, u64)> = inner
                .entries
                .iter()
                .map(|(k, e)| (k.clone(), e.last_access))
                .collect();
            by_age.sort_by_key(|(_, access)| *access);
            for (key, _) in by_age.into_iter().take(evict_batch) {
                inner.entries.remove(&key);
            }
            tracing::debug!(evicted = evict_batch, "render cache eviction pass");
        }
    }

    pub fn invalidate(&self, key: &str) {
        let mut inner = self.inner.lock().expect("render cache lock poisoned");
        inner.entries.remove(key);
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock().expect("render cache lock poisoned");
        inner.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .expect("render cache lock poisoned")
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
