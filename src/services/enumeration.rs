//! Sources whose document URLs are known up front.

use crate::error::Result;
use crate::models::{Item, Run};
use crate::pipeline::ItemPipeline;

/// Numbered court filings: `{base}/001.pdf` through `{base}/{max}.pdf`,
/// then the sub-parts of the last docket, `{base}/{max}-1.pdf` onwards.
#[derive(Debug, Clone)]
pub struct FixedEnumeration {
    base_url: String,
    max_docket: u32,
    sub_parts: u32,
}

impl FixedEnumeration {
    pub fn new(base_url: &str, max_docket: u32, sub_parts: u32) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            max_docket,
            sub_parts,
        }
    }

    pub fn urls(&self) -> Vec<String> {
        let numbered = (1..=self.max_docket).map(|n| format!("{}/{:03}.pdf", self.base_url, n));
        let sub_parts = (1..=self.sub_parts)
            .map(|k| format!("{}/{}-{}.pdf", self.base_url, self.max_docket, k));
        numbered.chain(sub_parts).collect()
    }

    pub async fn execute(&self, pipeline: &ItemPipeline, run: &mut Run) -> Result<()> {
        // Gaps in the docket numbering are expected.
        let items = self
            .urls()
            .into_iter()
            .map(|url| Item::remote(url).missing_ok(true))
            .collect();
        process_all(pipeline, run, items).await;
        Ok(())
    }
}

/// A short list of named FOIA releases: `{base}/Epstein%20Records%20{i}.pdf`.
#[derive(Debug, Clone)]
pub struct FixedRecordList {
    base_url: String,
    record_count: u32,
}

impl FixedRecordList {
    pub fn new(base_url: &str, record_count: u32) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            record_count,
        }
    }

    pub fn urls(&self) -> Vec<String> {
        (1..=self.record_count)
            .map(|i| format!("{}/Epstein%20Records%20{}.pdf", self.base_url, i))
            .collect()
    }

    pub async fn execute(&self, pipeline: &ItemPipeline, run: &mut Run) -> Result<()> {
        let items = self.urls().into_iter().map(Item::remote).collect();
        process_all(pipeline, run, items).await;
        Ok(())
    }
}

async fn process_all(pipeline: &ItemPipeline, run: &mut Run, items: Vec<Item>) {
    run.total_discovered = items.len() as u64;
    pipeline.persist_run(run).await;
    log::info!(
        "[{}] [{}] Enumerated {} documents",
        run.id,
        run.data_set,
        items.len()
    );

    for item in &items {
        pipeline.process(run, item).await;
    }
}
