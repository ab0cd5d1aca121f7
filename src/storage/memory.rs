//! In-process stores backed by mutex-guarded collections.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{Document, Event, Page, Run};
use crate::storage::{BlobStore, CatalogStore};

#[derive(Debug, Default)]
struct CatalogState {
    runs: HashMap<Uuid, Run>,
    /// Insertion order
    events: Vec<Event>,
    documents: HashMap<String, Document>,
}

/// Catalog held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    state: Mutex<CatalogState>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, CatalogState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Every event recorded for `run_id`, oldest first.
    pub fn events_for(&self, run_id: Uuid) -> Vec<Event> {
        self.state()
            .events
            .iter()
            .filter(|e| e.run_id == run_id)
            .cloned()
            .collect()
    }

    pub fn documents(&self) -> Vec<Document> {
        self.state().documents.values().cloned().collect()
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalog {
    async fn save_run(&self, run: &Run) -> Result<()> {
        self.state().runs.insert(run.id, run.clone());
        Ok(())
    }

    async fn save_event(&self, event: &Event) -> Result<()> {
        self.state().events.push(event.clone());
        Ok(())
    }

    async fn document_exists(&self, content_hash: &str) -> Result<bool> {
        Ok(self.state().documents.contains_key(content_hash))
    }

    async fn save_document(&self, mut document: Document) -> Result<Document> {
        let mut state = self.state();
        if state.documents.contains_key(&document.content_hash) {
            return Err(AppError::DuplicateDocument(document.content_hash));
        }
        document.id = Some(Uuid::new_v4());
        state
            .documents
            .insert(document.content_hash.clone(), document.clone());
        Ok(document)
    }

    async fn get_run(&self, id: Uuid) -> Result<Option<Run>> {
        Ok(self.state().runs.get(&id).cloned())
    }

    async fn list_runs(&self) -> Result<Vec<Run>> {
        let mut runs: Vec<Run> = self.state().runs.values().cloned().collect();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(runs)
    }

    async fn list_events(&self, run_id: Uuid, page: usize, size: usize) -> Result<Page<Event>> {
        let newest_first: Vec<Event> = self
            .state()
            .events
            .iter()
            .rev()
            .filter(|e| e.run_id == run_id)
            .cloned()
            .collect();
        Ok(Page::slice(&newest_first, page, size))
    }

    async fn count_documents_by_data_set(&self) -> Result<BTreeMap<String, u64>> {
        let mut counts = BTreeMap::new();
        for document in self.state().documents.values() {
            *counts.entry(document.data_set.clone()).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn count_documents(&self) -> Result<u64> {
        Ok(self.state().documents.len() as u64)
    }
}

/// Blob store keeping objects in memory.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    puts: Mutex<u64>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .keys()
            .cloned()
            .collect()
    }

    /// Number of `put` calls, including overwrites.
    pub fn put_count(&self) -> u64 {
        *self.puts.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, bytes: &[u8], key: &str) -> Result<String> {
        self.objects
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(key.to_string(), bytes.to_vec());
        *self.puts.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) += 1;
        Ok(key.to_string())
    }
}
