//! Local filesystem storage implementation.
//!
//! Catalog records are JSON files; each run's events are a JSON-lines log.
//! Document records are keyed by content hash and linked into place from a
//! complete temp file, so the filesystem itself enforces hash uniqueness
//! across concurrent runs and a record is never visible half-written.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{Document, Event, Page, Run};
use crate::storage::{BlobStore, CatalogStore};

const RUNS_DIR: &str = "runs";
const EVENTS_DIR: &str = "events";
const DOCUMENTS_DIR: &str = "documents";

/// Ensure parent directory exists.
async fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    Ok(())
}

/// Write bytes to a uniquely named sibling temp file of `path`.
async fn write_temp(path: &Path, bytes: &[u8]) -> Result<PathBuf> {
    ensure_parent(path).await?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{}.{}.tmp", file_name, Uuid::new_v4()));

    let written = async {
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        Ok::<_, std::io::Error>(())
    }
    .await;
    if let Err(e) = written {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(AppError::Io(e));
    }
    Ok(tmp)
}

/// Write bytes atomically (write to temp, then rename).
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = write_temp(path, bytes).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(AppError::Io(e));
    }
    Ok(())
}

/// Write bytes to `path` only if nothing is there yet.
///
/// The complete temp file is linked into place, so `path` never exists with
/// partial content. Returns `AlreadyExists` if another writer got there first.
async fn write_exclusive(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = write_temp(path, bytes).await?;
    let linked = tokio::fs::hard_link(&tmp, path).await;
    let _ = tokio::fs::remove_file(&tmp).await;
    linked.map_err(AppError::Io)
}

/// Read bytes, returning None if file doesn't exist.
async fn read_bytes(path: &Path) -> Result<Option<Vec<u8>>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(AppError::Io(e)),
    }
}

/// Read JSON data.
async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match read_bytes(path).await? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

/// Write JSON data.
async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &bytes).await
}

/// Paths of `*.json` files directly under `dir`; empty if `dir` is missing.
async fn json_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(AppError::Io(e)),
    };

    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            paths.push(path);
        }
    }
    Ok(paths)
}

/// Filesystem-backed catalog.
#[derive(Debug, Clone)]
pub struct LocalCatalog {
    root_dir: PathBuf,
}

impl LocalCatalog {
    /// Create a new LocalCatalog rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    fn run_path(&self, id: Uuid) -> PathBuf {
        self.root_dir.join(RUNS_DIR).join(format!("{id}.json"))
    }

    fn events_path(&self, run_id: Uuid) -> PathBuf {
        self.root_dir.join(EVENTS_DIR).join(format!("{run_id}.jsonl"))
    }

    fn document_path(&self, content_hash: &str) -> PathBuf {
        self.root_dir
            .join(DOCUMENTS_DIR)
            .join(format!("{content_hash}.json"))
    }

    async fn load_documents(&self) -> Result<Vec<Document>> {
        let mut documents = Vec::new();
        for path in json_files(&self.root_dir.join(DOCUMENTS_DIR)).await? {
            if let Some(document) = read_json::<Document>(&path).await? {
                documents.push(document);
            }
        }
        Ok(documents)
    }
}

#[async_trait]
impl CatalogStore for LocalCatalog {
    async fn save_run(&self, run: &Run) -> Result<()> {
        write_json(&self.run_path(run.id), run).await
    }

    async fn save_event(&self, event: &Event) -> Result<()> {
        let path = self.events_path(event.run_id);
        ensure_parent(&path).await?;

        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }

    async fn document_exists(&self, content_hash: &str) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.document_path(content_hash)).await?)
    }

    async fn save_document(&self, mut document: Document) -> Result<Document> {
        let path = self.document_path(&document.content_hash);

        document.id = Some(Uuid::new_v4());
        let bytes = serde_json::to_vec_pretty(&document)?;

        match write_exclusive(&path, &bytes).await {
            Ok(()) => Ok(document),
            Err(AppError::Io(e)) if e.kind() == ErrorKind::AlreadyExists => {
                Err(AppError::DuplicateDocument(document.content_hash))
            }
            Err(e) => Err(e),
        }
    }

    async fn get_run(&self, id: Uuid) -> Result<Option<Run>> {
        read_json(&self.run_path(id)).await
    }

    async fn list_runs(&self) -> Result<Vec<Run>> {
        let mut runs = Vec::new();
        for path in json_files(&self.root_dir.join(RUNS_DIR)).await? {
            match read_json::<Run>(&path).await {
                Ok(Some(run)) => runs.push(run),
                Ok(None) => {}
                Err(e) => log::warn!("Skipping unreadable run record {}: {}", path.display(), e),
            }
        }
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(runs)
    }

    async fn list_events(&self, run_id: Uuid, page: usize, size: usize) -> Result<Page<Event>> {
        let Some(bytes) = read_bytes(&self.events_path(run_id)).await? else {
            return Ok(Page::slice(&[], page, size));
        };

        let mut events = Vec::new();
        for line in bytes.split(|b| *b == b'\n') {
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            events.push(serde_json::from_slice::<Event>(line)?);
        }
        events.reverse();
        Ok(Page::slice(&events, page, size))
    }

    async fn count_documents_by_data_set(&self) -> Result<BTreeMap<String, u64>> {
        let mut counts = BTreeMap::new();
        for document in self.load_documents().await? {
            *counts.entry(document.data_set).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn count_documents(&self) -> Result<u64> {
        Ok(json_files(&self.root_dir.join(DOCUMENTS_DIR)).await?.len() as u64)
    }
}

/// Filesystem-backed blob store.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root_dir: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    /// Get the full path for a storage key.
    fn path(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let escapes = relative.components().any(|c| {
            !matches!(c, std::path::Component::Normal(_) | std::path::Component::CurDir)
        });
        if key.is_empty() || escapes {
            return Err(AppError::storage(key, "key must be a relative path"));
        }
        Ok(self.root_dir.join(relative))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, bytes: &[u8], key: &str) -> Result<String> {
        let path = self.path(key)?;
        write_atomic(&path, bytes)
            .await
            .map_err(|e| AppError::storage(key, e))?;
        log::debug!("Stored {} bytes at {}", bytes.len(), path.display());
        Ok(key.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventType, RunStatus};
    use tempfile::TempDir;

    fn document(hash: &str, data_set: &str) -> Document {
        Document::new(
            "https://example.com/a.pdf",
            hash,
            format!("raw/{data_set}/a.pdf"),
            data_set,
            "a.pdf",
            3,
        )
    }

    #[tokio::test]
    async fn test_run_roundtrip_and_listing_order() {
        let dir = TempDir::new().unwrap();
        let catalog = LocalCatalog::new(dir.path());

        let mut older = Run::new("foia", "FOIA");
        older.started_at -= chrono::Duration::seconds(60);
        let mut newer = Run::new("court-records", "COURT_RECORDS");
        catalog.save_run(&older).await.unwrap();
        catalog.save_run(&newer).await.unwrap();

        newer.downloaded = 7;
        newer.finish(RunStatus::Completed);
        catalog.save_run(&newer).await.unwrap();

        let loaded = catalog.get_run(newer.id).await.unwrap().unwrap();
        assert_eq!(loaded.downloaded, 7);
        assert_eq!(loaded.status, RunStatus::Completed);

        let runs = catalog.list_runs().await.unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].id, newer.id);
        assert_eq!(runs[1].id, older.id);

        assert!(catalog.get_run(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_document_hash_is_unique() {
        let dir = TempDir::new().unwrap();
        let catalog = LocalCatalog::new(dir.path());

        assert!(!catalog.document_exists("abc").await.unwrap());
        let saved = catalog.save_document(document("abc", "foia")).await.unwrap();
        assert!(saved.id.is_some());
        assert!(catalog.document_exists("abc").await.unwrap());

        let err = catalog.save_document(document("abc", "foia")).await.unwrap_err();
        assert!(matches!(err, AppError::DuplicateDocument(_)));

        catalog
            .save_document(document("def", "court-records"))
            .await
            .unwrap();
        assert_eq!(catalog.count_documents().await.unwrap(), 2);
        let counts = catalog.count_documents_by_data_set().await.unwrap();
        assert_eq!(counts.get("foia"), Some(&1));
        assert_eq!(counts.get("court-records"), Some(&1));
    }

    #[tokio::test]
    async fn test_interrupted_document_write_is_not_registered() {
        let dir = TempDir::new().unwrap();
        let catalog = LocalCatalog::new(dir.path());
        let documents_dir = dir.path().join(DOCUMENTS_DIR);

        // What a write cut short leaves behind: a truncated temp file.
        std::fs::create_dir_all(&documents_dir).unwrap();
        std::fs::write(documents_dir.join(".abc.json.0000.tmp"), b"{\"id\":").unwrap();

        assert!(!catalog.document_exists("abc").await.unwrap());
        assert_eq!(catalog.count_documents().await.unwrap(), 0);
        assert!(catalog.count_documents_by_data_set().await.unwrap().is_empty());

        catalog.save_document(document("abc", "foia")).await.unwrap();
        assert!(catalog.document_exists("abc").await.unwrap());
        let err = catalog.save_document(document("abc", "foia")).await.unwrap_err();
        assert!(matches!(err, AppError::DuplicateDocument(_)));

        let names: Vec<String> = std::fs::read_dir(&documents_dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.iter().filter(|n| n.ends_with(".tmp")).count(), 1);
        assert!(names.contains(&"abc.json".to_string()));

        let stored: Document =
            serde_json::from_slice(&std::fs::read(documents_dir.join("abc.json")).unwrap()).unwrap();
        assert_eq!(stored.content_hash, "abc");
    }

    #[tokio::test]
    async fn test_event_log_paging() {
        let dir = TempDir::new().unwrap();
        let catalog = LocalCatalog::new(dir.path());
        let run_id = Uuid::new_v4();

        for i in 0..5 {
            let event = Event::new(
                run_id,
                EventType::DocumentDiscovered,
                Some("https://example.com/a.pdf"),
                format!("event {i}"),
            );
            catalog.save_event(&event).await.unwrap();
        }

        let first = catalog.list_events(run_id, 0, 2).await.unwrap();
        assert_eq!(first.total, 5);
        assert_eq!(first.items[0].message, "event 4");
        assert_eq!(first.items[1].message, "event 3");

        let last = catalog.list_events(run_id, 2, 2).await.unwrap();
        assert_eq!(last.items.len(), 1);
        assert_eq!(last.items[0].message, "event 0");

        let empty = catalog.list_events(Uuid::new_v4(), 0, 50).await.unwrap();
        assert_eq!(empty.total, 0);
    }

    #[tokio::test]
    async fn test_blob_put_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let blobs = LocalBlobStore::new(dir.path());

        let key = blobs.put(b"first", "raw/foia/a.pdf").await.unwrap();
        assert_eq!(key, "raw/foia/a.pdf");
        blobs.put(b"second", "raw/foia/a.pdf").await.unwrap();

        let stored = std::fs::read(dir.path().join("raw/foia/a.pdf")).unwrap();
        assert_eq!(stored, b"second");

        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("raw/foia"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_blob_key_cannot_escape_root() {
        let dir = TempDir::new().unwrap();
        let blobs = LocalBlobStore::new(dir.path());

        let err = blobs.put(b"x", "../outside.pdf").await.unwrap_err();
        assert!(matches!(err, AppError::Storage { .. }));
    }
}
