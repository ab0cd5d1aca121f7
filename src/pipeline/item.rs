//! Per-item ingestion: fetch, hash, dedup, store, register, account.
//!
//! Every item ends in exactly one of three outcomes and bumps exactly one run
//! counter. Nothing that goes wrong with a single item escapes `process`.

use std::borrow::Cow;
use std::sync::Arc;

use tokio::time::Instant;

use crate::error::{AppError, Result};
use crate::fetch::ResilientFetcher;
use crate::models::{Document, Event, EventType, Item, Payload, Run, StorageConfig};
use crate::pipeline::registry::ActiveRuns;
use crate::storage::{BlobStore, CatalogStore};
use crate::telemetry::Telemetry;
use crate::utils::content_hash;

/// How a single item ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    Stored(Document),
    SkippedDuplicate { content_hash: String },
    Failed(String),
}

enum Ingested {
    Stored(Document),
    Duplicate(String),
}

/// Shared per-item pipeline used by every run.
pub struct ItemPipeline {
    fetcher: Arc<ResilientFetcher>,
    catalog: Arc<dyn CatalogStore>,
    blobs: Arc<dyn BlobStore>,
    telemetry: Arc<dyn Telemetry>,
    active: Arc<ActiveRuns>,
    storage: StorageConfig,
}

impl ItemPipeline {
    pub fn new(
        fetcher: Arc<ResilientFetcher>,
        catalog: Arc<dyn CatalogStore>,
        blobs: Arc<dyn BlobStore>,
        telemetry: Arc<dyn Telemetry>,
        active: Arc<ActiveRuns>,
        storage: StorageConfig,
    ) -> Self {
        Self {
            fetcher,
            catalog,
            blobs,
            telemetry,
            active,
            storage,
        }
    }

    pub fn fetcher(&self) -> &ResilientFetcher {
        &self.fetcher
    }

    /// Run one item through the pipeline and account for the result.
    pub async fn process(&self, run: &mut Run, item: &Item) -> ItemOutcome {
        self.telemetry.active_downloads_increment(&run.data_set);
        let result = self.ingest(run, item).await;
        self.telemetry.active_downloads_decrement(&run.data_set);

        let outcome = match result {
            Ok(Ingested::Stored(document)) => self.account_stored(run, document).await,
            Ok(Ingested::Duplicate(hash)) => self.account_duplicate(run, item, hash).await,
            Err(error) => self.account_failure(run, item, &error).await,
        };
        self.report_progress(run);
        outcome
    }

    /// Count `item` as failed without running it.
    ///
    /// Used when an item was discovered but its bytes could not be produced.
    pub async fn reject(&self, run: &mut Run, item: &Item, error: &AppError) -> ItemOutcome {
        let outcome = self.account_failure(run, item, error).await;
        self.report_progress(run);
        outcome
    }

    async fn ingest(&self, run: &Run, item: &Item) -> Result<Ingested> {
        let bytes: Cow<'_, [u8]> = match &item.payload {
            Payload::Remote => Cow::Owned(self.fetcher.fetch_bytes(&item.source_url).await?),
            Payload::Inline(content) => Cow::Borrowed(content),
        };

        let hash = content_hash(&bytes);
        if self.catalog.document_exists(&hash).await? {
            return Ok(Ingested::Duplicate(hash));
        }

        let key = self.storage.document_key(&run.data_set, &item.file_name);
        let start = Instant::now();
        let stored_key = self.blobs.put(&bytes, &key).await?;
        self.telemetry.storage_upload(start.elapsed());

        let document = Document::new(
            &item.source_url,
            hash,
            stored_key,
            &run.data_set,
            &item.file_name,
            bytes.len() as u64,
        );
        match self.catalog.save_document(document).await {
            Ok(document) => Ok(Ingested::Stored(document)),
            // Registered concurrently by another run.
            Err(AppError::DuplicateDocument(hash)) => Ok(Ingested::Duplicate(hash)),
            Err(e) => Err(e),
        }
    }

    async fn account_stored(&self, run: &mut Run, document: Document) -> ItemOutcome {
        log::info!(
            "[{}] [{}] Downloaded {} ({} bytes)",
            run.id,
            run.data_set,
            document.file_name,
            document.size_bytes
        );
        self.record_event(
            Event::new(
                run.id,
                EventType::DocumentDownloaded,
                Some(document.source_url.as_str()),
                format!(
                    "Downloaded {} ({} bytes) -> {}",
                    document.file_name, document.size_bytes, document.storage_key
                ),
            )
            .with_document(document.id),
        )
        .await;

        run.downloaded += 1;
        self.persist_run(run).await;
        self.telemetry
            .document_downloaded(&run.data_set, &run.source_type);
        self.telemetry
            .bytes_downloaded(&run.data_set, document.size_bytes);
        ItemOutcome::Stored(document)
    }

    async fn account_duplicate(&self, run: &mut Run, item: &Item, hash: String) -> ItemOutcome {
        log::info!(
            "[{}] [{}] Skipping duplicate {} (hash {})",
            run.id,
            run.data_set,
            item.file_name,
            hash
        );
        self.record_event(Event::new(
            run.id,
            EventType::DocumentSkippedDuplicate,
            Some(item.source_url.as_str()),
            format!("Hash: {hash}"),
        ))
        .await;

        run.skipped_duplicate += 1;
        self.persist_run(run).await;
        self.telemetry
            .document_skipped_duplicate(&run.data_set, &run.source_type);
        ItemOutcome::SkippedDuplicate { content_hash: hash }
    }

    async fn account_failure(&self, run: &mut Run, item: &Item, error: &AppError) -> ItemOutcome {
        // Gaps in a numbered series are expected and stay off the failure metric.
        let expected_gap = item.missing_ok && error.is_not_found();
        if expected_gap {
            log::debug!("[{}] [{}] Not found: {}", run.id, run.data_set, item.source_url);
        } else {
            log::error!(
                "[{}] [{}] Failed to ingest {}: {}",
                run.id,
                run.data_set,
                item.source_url,
                error
            );
        }
        let message = error.to_string();
        self.record_event(Event::new(
            run.id,
            EventType::DocumentFailed,
            Some(item.source_url.as_str()),
            message.clone(),
        ))
        .await;

        run.failed += 1;
        self.persist_run(run).await;
        if !expected_gap {
            self.telemetry
                .document_failed(&run.data_set, &run.source_type);
        }
        ItemOutcome::Failed(message)
    }

    fn report_progress(&self, run: &Run) {
        if run.total_discovered > 0 {
            self.telemetry
                .run_progress(&run.data_set, run.progress_percent());
        }
    }

    /// Write the run snapshot to the catalog and the active registry.
    ///
    /// A failed write is logged; the run carries on.
    pub async fn persist_run(&self, run: &Run) {
        self.active.update(run);
        if let Err(e) = self.catalog.save_run(run).await {
            log::warn!("[{}] [{}] Failed to persist run: {}", run.id, run.data_set, e);
        }
    }

    /// Append an audit event. A failed write is logged and dropped.
    pub async fn record_event(&self, event: Event) {
        if let Err(e) = self.catalog.save_event(&event).await {
            log::warn!(
                "[{}] Failed to record {} event: {}",
                event.run_id,
                event.event_type,
                e
            );
        }
    }
}
