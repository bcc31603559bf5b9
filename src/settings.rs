//! JSON-backed key-value settings store.
//!
//! Holds small persisted flags owned by this core, most importantly
//! the embedding-migration completion flag. Writes go straight to
//! disk so a restart sees the latest state.

use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde_json::{Map, Value};

use crate::errors::RagError;

#[derive(Clone)]
pub struct SettingsStore {
    inner: Arc<Mutex<Map<String, Value>>>,
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Self {
        let data = load(&path).unwrap_or_default();
        Self {
            inner: Arc::new(Mutex::new(data)),
            path,
        }
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.inner
            .lock()
            .ok()
            .and_then(|guard| guard.get(key).and_then(Value::as_bool))
            .unwrap_or(false)
    }

    pub fn set_bool(&self, key: &str, value: bool) -> Result<(), RagError> {
        {
            let mut guard = self.inner.lock().map_err(RagError::internal)?;
            guard.insert(key.to_string(), Value::Bool(value));
        }
        self.save()
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.inner
            .lock()
            .ok()
            .and_then(|guard| guard.get(key).and_then(Value::as_str).map(str::to_string))
    }

    pub fn set_string(&self, key: &str, value: &str) -> Result<(), RagError> {
        {
            let mut guard = self.inner.lock().map_err(RagError::internal)?;
            guard.insert(key.to_string(), Value::String(value.to_string()));
        }
        self.save()
    }

    fn save(&self) -> Result<(), RagError> {
        if let Some(parent) = self.path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        let guard = self.inner.lock().map_err(RagError::internal)?;
        let data = serde_json::to_string_pretty(&*guard).map_err(RagError::internal)?;
        fs::write(&self.path, data).map_err(RagError::internal)?;
        Ok(())
    }
}

fn load(path: &PathBuf) -> Option<Map<String, Value>> {
    let contents = fs::read_to_string(path).ok()?;
    serde_json::from_str::<Value>(&contents)
        .ok()?
        .as_object()
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("settings.json");

        let store = SettingsStore::new(path.clone());
        assert!(!store.get_bool("migrated"));

        store.set_bool("migrated", true).unwrap();
        store.set_string("model", "embed-v2").unwrap();

        // A fresh instance reads the persisted state.
        let reopened = SettingsStore::new(path);
        assert!(reopened.get_bool("migrated"));
        assert_eq!(reopened.get_string("model").as_deref(), Some("embed-v2"));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(tmp.path().join("absent.json"));
        assert!(!store.get_bool("anything"));
        assert_eq!(store.get_string("anything"), None);
    }
}
