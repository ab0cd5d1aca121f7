//! Append-only audit events.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of transition recorded by an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    DocumentDiscovered,
    DocumentDownloaded,
    DocumentSkippedDuplicate,
    DocumentFailed,
    DiscoveryFailed,
    IngestionRunStarted,
    IngestionRunCompleted,
    IngestionRunFailed,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::DocumentDiscovered => "DOCUMENT_DISCOVERED",
            EventType::DocumentDownloaded => "DOCUMENT_DOWNLOADED",
            EventType::DocumentSkippedDuplicate => "DOCUMENT_SKIPPED_DUPLICATE",
            EventType::DocumentFailed => "DOCUMENT_FAILED",
            EventType::DiscoveryFailed => "DISCOVERY_FAILED",
            EventType::IngestionRunStarted => "INGESTION_RUN_STARTED",
            EventType::IngestionRunCompleted => "INGESTION_RUN_COMPLETED",
            EventType::IngestionRunFailed => "INGESTION_RUN_FAILED",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable audit record tied to a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub run_id: Uuid,
    #[serde(default)]
    pub document_id: Option<Uuid>,
    pub event_type: EventType,
    #[serde(default)]
    pub source_url: Option<String>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(
        run_id: Uuid,
        event_type: EventType,
        source_url: Option<&str>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            run_id,
            document_id: None,
            event_type,
            source_url: source_url.map(str::to_string),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    /// Attach the document this event refers to.
    pub fn with_document(mut self, document_id: Option<Uuid>) -> Self {
        self.document_id = document_id;
        self
    }
}

/// One page of a newest-first listing.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub size: usize,
    pub total: usize,
}

impl<T: Clone> Page<T> {
    /// Slice `page` of `size` out of an already ordered list.
    pub fn slice(all: &[T], page: usize, size: usize) -> Self {
        let start = page.saturating_mul(size).min(all.len());
        let end = start.saturating_add(size).min(all.len());
        Self {
            items: all[start..end].to_vec(),
            page,
            size,
            total: all.len(),
        }
    }

    pub fn total_pages(&self) -> usize {
        if self.size == 0 {
            return 0;
        }
        self.total.div_ceil(self.size)
    }
}
