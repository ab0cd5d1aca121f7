//! Ingestion pipeline.
//!
//! - `ItemPipeline`: fetch, hash, dedup, store and account for one item
//! - `RunOrchestrator`: run lifecycle on a bounded worker pool
//! - `ActiveRuns`: snapshots of runs still executing

pub mod item;
pub mod orchestrator;
pub mod registry;

pub use item::{ItemOutcome, ItemPipeline};
pub use orchestrator::RunOrchestrator;
pub use registry::ActiveRuns;
