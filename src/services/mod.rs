//! Source strategies for the ingestor.
//!
//! This module contains the discovery logic for every upstream source:
//! - Fixed URL enumeration (`FixedEnumeration`, `FixedRecordList`)
//! - Paginated HTML listings (`ListingDiscovery`)
//! - Bulk ZIP archives (`ArchiveDownload`)
//!
//! and the routing table from data-set names to source kinds.

mod archive;
mod enumeration;
mod listing;

use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::{Run, SourcesConfig};
use crate::pipeline::ItemPipeline;

pub use archive::ArchiveDownload;
pub use enumeration::{FixedEnumeration, FixedRecordList};
pub use listing::{ListingDiscovery, extract_pdf_links};

/// Data sets distributed as bulk archives.
const ARCHIVE_DATA_SETS: [u32; 9] = [1, 2, 3, 4, 5, 6, 7, 8, 12];
/// Data sets published as paginated listings.
const LISTING_DATA_SETS: [u32; 3] = [9, 10, 11];

pub const COURT_RECORDS: &str = "court-records";
pub const FOIA: &str = "foia";

/// Kind of upstream source a data set is ingested from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceKind {
    CourtRecords,
    DojDisclosures,
    ZipDownload,
    Foia,
}

impl SourceKind {
    pub const ALL: [SourceKind; 4] = [
        SourceKind::CourtRecords,
        SourceKind::DojDisclosures,
        SourceKind::ZipDownload,
        SourceKind::Foia,
    ];

    /// Tag recorded on runs and telemetry.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::CourtRecords => "COURT_RECORDS",
            Self::DojDisclosures => "DOJ_DISCLOSURES",
            Self::ZipDownload => "ZIP_DOWNLOAD",
            Self::Foia => "FOIA",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

static DATA_SET_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^data-set-([1-9]\d*)$").ok());

/// Number `n` of a `data-set-n` name. Zero-padded aliases are not names.
pub fn data_set_number(data_set: &str) -> Option<u32> {
    let n: u32 = DATA_SET_PATTERN
        .as_ref()?
        .captures(data_set)?
        .get(1)?
        .as_str()
        .parse()
        .ok()?;
    (format!("data-set-{n}") == data_set).then_some(n)
}

/// Route a data-set name to its source kind.
pub fn resolve_source(data_set: &str) -> Result<SourceKind> {
    match data_set {
        COURT_RECORDS => return Ok(SourceKind::CourtRecords),
        FOIA => return Ok(SourceKind::Foia),
        _ => {}
    }

    match data_set_number(data_set) {
        Some(n) if ARCHIVE_DATA_SETS.contains(&n) => Ok(SourceKind::ZipDownload),
        Some(n) if LISTING_DATA_SETS.contains(&n) => Ok(SourceKind::DojDisclosures),
        _ => Err(AppError::UnknownDataSet(data_set.to_string())),
    }
}

/// Every routable data-set name, sorted lexicographically.
pub fn known_data_sets() -> Vec<String> {
    let mut names: Vec<String> = ARCHIVE_DATA_SETS
        .iter()
        .chain(LISTING_DATA_SETS.iter())
        .map(|n| format!("data-set-{n}"))
        .collect();
    names.push(COURT_RECORDS.to_string());
    names.push(FOIA.to_string());
    names.sort();
    names
}

/// Number of a DOJ data set, or a top-level error for the run.
pub(crate) fn require_data_set_number(data_set: &str) -> Result<u32> {
    data_set_number(data_set).ok_or_else(|| {
        AppError::discovery(format!("Data set '{data_set}' has no data-set number"))
    })
}

/// Discovery procedure for one source kind.
#[derive(Debug, Clone)]
pub enum SourceStrategy {
    FixedEnumeration(FixedEnumeration),
    PaginatedHtmlDiscovery(ListingDiscovery),
    ArchiveDownload(ArchiveDownload),
    FixedRecordList(FixedRecordList),
}

impl SourceStrategy {
    fn for_kind(kind: SourceKind, sources: &SourcesConfig) -> Self {
        match kind {
            SourceKind::CourtRecords => Self::FixedEnumeration(FixedEnumeration::new(
                &sources.court_records_base_url,
                sources.max_docket,
                sources.sub_parts,
            )),
            SourceKind::DojDisclosures => Self::PaginatedHtmlDiscovery(ListingDiscovery::new(
                &sources.doj_disclosures_base_url,
                sources.max_listing_pages,
            )),
            SourceKind::ZipDownload => {
                Self::ArchiveDownload(ArchiveDownload::new(&sources.doj_disclosures_base_url))
            }
            SourceKind::Foia => Self::FixedRecordList(FixedRecordList::new(
                &sources.foia_base_url,
                sources.foia_record_count,
            )),
        }
    }

    pub fn kind(&self) -> SourceKind {
        match self {
            Self::FixedEnumeration(_) => SourceKind::CourtRecords,
            Self::PaginatedHtmlDiscovery(_) => SourceKind::DojDisclosures,
            Self::ArchiveDownload(_) => SourceKind::ZipDownload,
            Self::FixedRecordList(_) => SourceKind::Foia,
        }
    }

    /// Discover the run's items and push each through the pipeline.
    ///
    /// Item failures are absorbed into the run's counters; an `Err` here
    /// means the run itself failed.
    pub async fn execute(&self, pipeline: &ItemPipeline, run: &mut Run) -> Result<()> {
        match self {
            Self::FixedEnumeration(strategy) => strategy.execute(pipeline, run).await,
            Self::PaginatedHtmlDiscovery(strategy) => strategy.execute(pipeline, run).await,
            Self::ArchiveDownload(strategy) => strategy.execute(pipeline, run).await,
            Self::FixedRecordList(strategy) => strategy.execute(pipeline, run).await,
        }
    }
}

/// Lookup table from source kind to strategy, built once at startup.
#[derive(Debug, Clone)]
pub struct StrategyRegistry {
    strategies: HashMap<SourceKind, SourceStrategy>,
}

impl StrategyRegistry {
    pub fn new(sources: &SourcesConfig) -> Self {
        let strategies = SourceKind::ALL
            .into_iter()
            .map(|kind| (kind, SourceStrategy::for_kind(kind, sources)))
            .collect();
        Self { strategies }
    }

    pub fn get(&self, kind: SourceKind) -> Result<&SourceStrategy> {
        self.strategies
            .get(&kind)
            .ok_or_else(|| AppError::config(format!("No strategy registered for {kind}")))
    }
}
