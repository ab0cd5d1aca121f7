// src/models/mod.rs

//! Domain models for the ingestor.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod document;
mod event;
mod item;
mod run;

// Re-export all public types
pub use config::{
    CircuitBreakerConfig, ConcurrencyConfig, Config, HttpConfig, RateLimitConfig, SourcesConfig,
    StorageConfig,
};
pub use document::{Document, ProcessingState};
pub use event::{Event, EventType, Page};
pub use item::{Item, Payload, entry_file_name, file_name_from_url};
pub use run::{Run, RunStatus};
