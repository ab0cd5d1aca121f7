//! Bulk ZIP archive ingestion.
//!
//! The archive is fetched once, then walked entry by entry. Each PDF entry is
//! decompressed and run through the pipeline before the next one is read, so
//! at most one entry's content is held besides the archive itself.

use std::io::{Cursor, Read};

use zip::ZipArchive;

use crate::error::Result;
use crate::models::{Event, EventType, Item, Run};
use crate::pipeline::ItemPipeline;
use crate::services::require_data_set_number;
use crate::utils::is_pdf_name;

/// Upper bound on the up-front buffer reserved for one entry.
const MAX_ENTRY_PREALLOC: u64 = 64 * 1024 * 1024;

/// Discovery over a single downloadable ZIP of PDFs.
#[derive(Debug, Clone)]
pub struct ArchiveDownload {
    base_url: String,
}

impl ArchiveDownload {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn archive_url(&self, number: u32) -> String {
        format!("{}/data-set-{}.zip", self.base_url, number)
    }

    pub async fn execute(&self, pipeline: &ItemPipeline, run: &mut Run) -> Result<()> {
        let number = require_data_set_number(&run.data_set)?;
        let archive_url = self.archive_url(number);

        pipeline
            .record_event(Event::new(
                run.id,
                EventType::DocumentDiscovered,
                Some(archive_url.as_str()),
                "Archive discovered",
            ))
            .await;
        log::info!("[{}] [{}] Downloading {}", run.id, run.data_set, archive_url);

        let fetched = pipeline.fetcher().fetch_bytes(&archive_url).await;
        let opened: Result<ZipArchive<Cursor<Vec<u8>>>> = match fetched {
            Ok(bytes) => {
                log::info!(
                    "[{}] [{}] Archive downloaded ({} bytes)",
                    run.id,
                    run.data_set,
                    bytes.len()
                );
                ZipArchive::new(Cursor::new(bytes)).map_err(Into::into)
            }
            Err(e) => Err(e),
        };
        let mut archive = match opened {
            Ok(archive) => archive,
            Err(e) => {
                log::error!(
                    "[{}] [{}] Archive {} unavailable: {}",
                    run.id,
                    run.data_set,
                    archive_url,
                    e
                );
                pipeline
                    .record_event(Event::new(
                        run.id,
                        EventType::DiscoveryFailed,
                        Some(archive_url.as_str()),
                        e.to_string(),
                    ))
                    .await;
                return Ok(());
            }
        };

        let mut pdf_entries = 0u64;
        for index in 0..archive.len() {
            let Some(name) = archive.name_for_index(index).map(str::to_string) else {
                continue;
            };
            if name.ends_with('/') || !is_pdf_name(&name) {
                continue;
            }
            pdf_entries += 1;

            // Read synchronously so the entry is released before any await.
            match read_entry(&mut archive, index) {
                Ok(content) => {
                    let item = Item::archived(&archive_url, &name, content);
                    pipeline.process(run, &item).await;
                }
                Err(e) => {
                    let item = Item::archived(&archive_url, &name, Vec::new());
                    pipeline.reject(run, &item, &e).await;
                }
            }
        }

        run.total_discovered += pdf_entries;
        pipeline.persist_run(run).await;
        log::info!(
            "[{}] [{}] Processed {} PDF entries from {} archive entries",
            run.id,
            run.data_set,
            pdf_entries,
            archive.len()
        );
        Ok(())
    }
}

fn read_entry(archive: &mut ZipArchive<Cursor<Vec<u8>>>, index: usize) -> Result<Vec<u8>> {
    let mut file = archive.by_index(index)?;
    let mut content = Vec::with_capacity(file.size().min(MAX_ENTRY_PREALLOC) as usize);
    file.read_to_end(&mut content)?;
    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Payload;
    use crate::testing::{Harness, build_zip};

    const BASE: &str = "https://doj.example.gov/epstein";

    #[tokio::test(start_paused = true)]
    async fn test_only_pdf_entries_become_items() {
        let harness = Harness::new();
        let strategy = ArchiveDownload::new(BASE);
        let zip = build_zip(&[
            ("VOL00001/", ""),
            ("VOL00001/IMAGES/EFTA00000001.pdf", "first pdf"),
            ("README.txt", "not a document"),
            ("VOL00001/IMAGES/EFTA00000002.PDF", "second pdf"),
        ]);
        harness.transport.respond(&strategy.archive_url(1), 200, &zip);
        let pipeline = harness.pipeline();
        let mut run = Run::new("data-set-1", "ZIP_DOWNLOAD");

        strategy.execute(&pipeline, &mut run).await.unwrap();

        assert_eq!(run.total_discovered, 2);
        assert_eq!(run.downloaded, 2);
        assert_eq!(run.failed, 0);
        assert_eq!(
            harness.blobs.keys(),
            vec![
                "raw/data-set-1/EFTA00000001.pdf".to_string(),
                "raw/data-set-1/EFTA00000002.PDF".to_string(),
            ]
        );

        let documents = harness.catalog.documents();
        assert!(documents.iter().any(|d| d.source_url
            == "https://doj.example.gov/epstein/data-set-1.zip#VOL00001/IMAGES/EFTA00000001.pdf"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_archive_entries_are_deduplicated() {
        let harness = Harness::new();
        let strategy = ArchiveDownload::new(BASE);
        let zip = build_zip(&[("a.pdf", "same"), ("b.pdf", "same")]);
        harness.transport.respond(&strategy.archive_url(12), 200, &zip);
        let pipeline = harness.pipeline();
        let mut run = Run::new("data-set-12", "ZIP_DOWNLOAD");

        strategy.execute(&pipeline, &mut run).await.unwrap();

        assert_eq!(run.total_discovered, 2);
        assert_eq!(run.downloaded, 1);
        assert_eq!(run.skipped_duplicate, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_archive_is_a_discovery_failure() {
        let harness = Harness::new();
        let strategy = ArchiveDownload::new(BASE);
        let pipeline = harness.pipeline();
        let mut run = Run::new("data-set-3", "ZIP_DOWNLOAD");

        strategy.execute(&pipeline, &mut run).await.unwrap();

        assert_eq!(run.total_discovered, 0);
        assert_eq!(run.processed(), 0);
        let kinds: Vec<_> = harness
            .catalog
            .events_for(run.id)
            .into_iter()
            .map(|e| e.event_type)
            .collect();
        assert_eq!(
            kinds,
            vec![EventType::DocumentDiscovered, EventType::DiscoveryFailed]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_corrupt_archive_is_a_discovery_failure() {
        let harness = Harness::new();
        let strategy = ArchiveDownload::new(BASE);
        harness
            .transport
            .respond(&strategy.archive_url(4), 200, b"definitely not a zip");
        let pipeline = harness.pipeline();
        let mut run = Run::new("data-set-4", "ZIP_DOWNLOAD");

        strategy.execute(&pipeline, &mut run).await.unwrap();

        assert_eq!(run.processed(), 0);
        assert!(
            harness
                .catalog
                .events_for(run.id)
                .iter()
                .any(|e| e.event_type == EventType::DiscoveryFailed)
        );
    }

    #[test]
    fn test_archived_item_shape() {
        let item = Item::archived(
            "https://doj.example.gov/epstein/data-set-1.zip",
            "VOL00001/IMAGES/EFTA00000001.pdf",
            b"x".to_vec(),
        );
        assert_eq!(item.file_name, "EFTA00000001.pdf");
        assert_eq!(item.payload, Payload::Inline(b"x".to_vec()));
    }
}
