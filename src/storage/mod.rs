//! Persistence collaborators for the ingestor.
//!
//! Two seams:
//! - [`CatalogStore`]: runs, documents and the event log
//! - [`BlobStore`]: raw document bytes addressed by storage key
//!
//! ## Local layout
//!
//! ```text
//! {root}/
//! ├── catalog/
//! │   ├── runs/{run_id}.json
//! │   ├── events/{run_id}.jsonl
//! │   └── documents/{sha256}.json
//! └── blobs/
//!     └── {prefix}/{data_set}/{file_name}
//! ```

pub mod local;
pub mod memory;
#[cfg(feature = "s3")]
pub mod s3;

use std::collections::BTreeMap;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{Document, Event, Page, Run};

pub use local::{LocalBlobStore, LocalCatalog};
pub use memory::{MemoryBlobStore, MemoryCatalog};
#[cfg(feature = "s3")]
pub use s3::S3BlobStore;

/// Store of runs, documents and events.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Insert or replace a run snapshot.
    async fn save_run(&self, run: &Run) -> Result<()>;

    /// Append an event to its run's log.
    async fn save_event(&self, event: &Event) -> Result<()>;

    async fn document_exists(&self, content_hash: &str) -> Result<bool>;

    /// Register a document and return it with its assigned id.
    ///
    /// Fails with `AppError::DuplicateDocument` if the content hash is
    /// already registered.
    async fn save_document(&self, document: Document) -> Result<Document>;

    async fn get_run(&self, id: Uuid) -> Result<Option<Run>>;

    /// All runs, newest first.
    async fn list_runs(&self) -> Result<Vec<Run>>;

    /// One page of a run's events, newest first.
    async fn list_events(&self, run_id: Uuid, page: usize, size: usize) -> Result<Page<Event>>;

    async fn count_documents_by_data_set(&self) -> Result<BTreeMap<String, u64>>;

    async fn count_documents(&self) -> Result<u64>;
}

/// Object storage for document bytes.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write `bytes` under `key`, replacing any existing object.
    ///
    /// Returns the key the bytes were stored under.
    async fn put(&self, bytes: &[u8], key: &str) -> Result<String>;
}
