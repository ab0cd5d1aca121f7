//! Snapshots of runs currently executing.

use std::collections::HashMap;
use std::sync::RwLock;

use uuid::Uuid;

use crate::models::Run;

/// Concurrency-safe map of active runs keyed by id.
#[derive(Debug, Default)]
pub struct ActiveRuns {
    runs: RwLock<HashMap<Uuid, Run>>,
}

impl ActiveRuns {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, run: Run) {
        self.runs
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(run.id, run);
    }

    /// Replace the snapshot of a run that is still registered.
    pub fn update(&self, run: &Run) {
        let mut runs = self
            .runs
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(slot) = runs.get_mut(&run.id) {
            slot.clone_from(run);
        }
    }

    pub fn remove(&self, id: Uuid) -> Option<Run> {
        self.runs
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&id)
    }

    /// All active runs, oldest first.
    pub fn snapshot(&self) -> Vec<Run> {
        let mut runs: Vec<Run> = self
            .runs
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .cloned()
            .collect();
        runs.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        runs
    }

    pub fn len(&self) -> usize {
        self.runs
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
