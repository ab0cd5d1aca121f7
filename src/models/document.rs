//! Archived document record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Downstream processing stage of a document.
///
/// The ingestor only ever creates `Ingested` documents; later stages belong
/// to extraction and indexing services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessingState {
    Ingested,
    Extracting,
    Extracted,
    ExtractFailed,
    Indexed,
}

/// Durable record of a successfully stored item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Assigned by the catalog store on save
    #[serde(default)]
    pub id: Option<Uuid>,
    pub source_url: String,
    /// SHA-256 of the raw bytes, lowercase hex
    pub content_hash: String,
    pub storage_key: String,
    pub data_set: String,
    pub file_name: String,
    pub size_bytes: u64,
    pub processing_state: ProcessingState,
    pub ingested_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    pub fn new(
        source_url: impl Into<String>,
        content_hash: impl Into<String>,
        storage_key: impl Into<String>,
        data_set: impl Into<String>,
        file_name: impl Into<String>,
        size_bytes: u64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            source_url: source_url.into(),
            content_hash: content_hash.into(),
            storage_key: storage_key.into(),
            data_set: data_set.into(),
            file_name: file_name.into(),
            size_bytes,
            processing_state: ProcessingState::Ingested,
            ingested_at: now,
            updated_at: now,
        }
    }
}
