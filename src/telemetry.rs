//! Telemetry sink for ingestion metrics.
//!
//! The exporter itself lives outside this crate. The ingestor reports through
//! the [`Telemetry`] trait; [`NoopTelemetry`] discards everything and
//! [`MemoryTelemetry`] keeps running totals that the CLI prints after a run.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::fetch::CircuitState;

/// Sink for counters, gauges and timers emitted by the ingestor.
///
/// Every method has an empty default so sinks only implement what they export.
pub trait Telemetry: Send + Sync {
    fn document_downloaded(&self, _data_set: &str, _source_type: &str) {}
    fn document_failed(&self, _data_set: &str, _source_type: &str) {}
    fn document_skipped_duplicate(&self, _data_set: &str, _source_type: &str) {}
    fn bytes_downloaded(&self, _data_set: &str, _bytes: u64) {}
    fn active_downloads_increment(&self, _data_set: &str) {}
    fn active_downloads_decrement(&self, _data_set: &str) {}
    fn run_progress(&self, _data_set: &str, _percent: f64) {}
    /// `status` is 0 when no response was received.
    fn http_request(&self, _status: u16, _elapsed: Duration) {}
    fn storage_upload(&self, _elapsed: Duration) {}
    fn rate_limit_wait(&self, _elapsed: Duration) {}
    fn circuit_breaker_state(&self, _state: CircuitState) {}
}

/// Telemetry sink that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTelemetry;

impl Telemetry for NoopTelemetry {}

/// In-process telemetry totals.
#[derive(Debug, Default)]
pub struct MemoryTelemetry {
    downloaded: AtomicU64,
    failed: AtomicU64,
    skipped_duplicate: AtomicU64,
    bytes: AtomicU64,
    http_requests: AtomicU64,
    uploads: AtomicU64,
    rate_limit_wait_ms: AtomicU64,
    breaker_state: AtomicU64,
    active_downloads: Mutex<HashMap<String, i64>>,
    progress: Mutex<HashMap<String, f64>>,
    http_statuses: Mutex<HashMap<u16, u64>>,
}

/// Point-in-time copy of [`MemoryTelemetry`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetrySnapshot {
    pub downloaded: u64,
    pub failed: u64,
    pub skipped_duplicate: u64,
    pub bytes: u64,
    pub http_requests: u64,
    pub uploads: u64,
    pub rate_limit_wait_ms: u64,
    /// 0 closed, 1 half-open, 2 open
    pub breaker_state: u64,
    pub active_downloads: HashMap<String, i64>,
    pub progress: HashMap<String, f64>,
    pub http_statuses: HashMap<u16, u64>,
}

impl MemoryTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            downloaded: self.downloaded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            skipped_duplicate: self.skipped_duplicate.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            http_requests: self.http_requests.load(Ordering::Relaxed),
            uploads: self.uploads.load(Ordering::Relaxed),
            rate_limit_wait_ms: self.rate_limit_wait_ms.load(Ordering::Relaxed),
            breaker_state: self.breaker_state.load(Ordering::Relaxed),
            active_downloads: lock(&self.active_downloads).clone(),
            progress: lock(&self.progress).clone(),
            http_statuses: lock(&self.http_statuses).clone(),
        }
    }
}

// Telemetry must never take the ingestor down, so a poisoned map is reused as is.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Telemetry for MemoryTelemetry {
    fn document_downloaded(&self, _data_set: &str, _source_type: &str) {
        self.downloaded.fetch_add(1, Ordering::Relaxed);
    }

    fn document_failed(&self, _data_set: &str, _source_type: &str) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    fn document_skipped_duplicate(&self, _data_set: &str, _source_type: &str) {
        self.skipped_duplicate.fetch_add(1, Ordering::Relaxed);
    }

    fn bytes_downloaded(&self, _data_set: &str, bytes: u64) {
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    fn active_downloads_increment(&self, data_set: &str) {
        *lock(&self.active_downloads)
            .entry(data_set.to_string())
            .or_default() += 1;
    }

    fn active_downloads_decrement(&self, data_set: &str) {
        if let Some(count) = lock(&self.active_downloads).get_mut(data_set) {
            *count -= 1;
        }
    }

    fn run_progress(&self, data_set: &str, percent: f64) {
        lock(&self.progress).insert(data_set.to_string(), percent);
    }

    fn http_request(&self, status: u16, _elapsed: Duration) {
        self.http_requests.fetch_add(1, Ordering::Relaxed);
        *lock(&self.http_statuses).entry(status).or_default() += 1;
    }

    fn storage_upload(&self, _elapsed: Duration) {
        self.uploads.fetch_add(1, Ordering::Relaxed);
    }

    fn rate_limit_wait(&self, elapsed: Duration) {
        self.rate_limit_wait_ms
            .fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);
    }

    fn circuit_breaker_state(&self, state: CircuitState) {
        self.breaker_state
            .store(state.gauge_value(), Ordering::Relaxed);
    }
}
