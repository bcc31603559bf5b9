//! UI-facing processing task registry.
//!
//! Pure observable state: the pipeline adds, updates and removes
//! entries as documents move through processing, and a UI layer polls
//! `snapshot`. Nothing here feeds back into the status machine.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct ProcessingTask {
    pub id: String,
    pub label: String,
    pub total_steps: usize,
    pub current_step: usize,
    pub status: String,
    pub started_at: DateTime<Utc>,
}

#[derive(Clone, Default)]
pub struct TaskRegistry {
    inner: Arc<Mutex<HashMap<String, ProcessingTask>>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, id: &str, label: &str, total_steps: usize) {
        let task = ProcessingTask {
            id: id.to_string(),
            label: label.to_string(),
            total_steps,
            current_step: 0,
            status: "queued".to_string(),
            started_at: Utc::now(),
        };
        if let Ok(mut guard) = self.inner.lock() {
            guard.insert(id.to_string(), task);
        }
    }

    pub fn update(&self, id: &str, current_step: usize, status: &str) {
        if let Ok(mut guard) = self.inner.lock() {
            if let Some(task) = guard.get_mut(id) {
                task.current_step = current_step;
                task.status = status.to_string();
            }
        }
    }

    pub fn remove(&self, id: &str) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.remove(id);
        }
    }

    pub fn snapshot(&self) -> Vec<ProcessingTask> {
        self.inner
            .lock()
            .map(|guard| guard.values().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_update_remove_lifecycle() {
        let registry = TaskRegistry::new();
        registry.add("d1", "Indexing notes.md", 4);

        registry.update("d1", 2, "embedding chunks");
        let tasks = registry.snapshot();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].current_step, 2);
        assert_eq!(tasks[0].status, "embedding chunks");

        registry.remove("d1");
        assert!(registry.snapshot().is_empty());
    }

    #[test]
    fn update_on_unknown_id_is_a_no_op() {
        let registry = TaskRegistry::new();
        registry.update("ghost", 1, "nope");
        assert!(registry.snapshot().is_empty());
    }
}
