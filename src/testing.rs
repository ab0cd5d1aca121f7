//! Shared fixtures for unit tests.

use std::collections::{HashMap, VecDeque};
use std::io::{Cursor, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::fetch::{HttpTransport, ResilientFetcher, TransportResponse};
use crate::models::Config;
use crate::pipeline::{ActiveRuns, ItemPipeline};
use crate::storage::{MemoryBlobStore, MemoryCatalog};
use crate::telemetry::MemoryTelemetry;

#[derive(Debug, Clone)]
enum Scripted {
    Status(u16, Vec<u8>),
    Error(String),
    Panic(String),
}

/// In-memory transport answering from per-URL scripts.
///
/// One-shot responses queued with `enqueue_*` are served first, then the
/// standing response from `respond`. Unknown URLs answer 404. With a
/// latency set, every exchange stays open that long on the tokio clock.
#[derive(Default)]
pub struct ScriptedTransport {
    queued: Mutex<HashMap<String, VecDeque<Scripted>>>,
    standing: Mutex<HashMap<String, Scripted>>,
    calls: Mutex<Vec<String>>,
    latency: Mutex<Option<Duration>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, url: &str, status: u16, body: &[u8]) {
        self.standing
            .lock()
            .unwrap()
            .insert(url.to_string(), Scripted::Status(status, body.to_vec()));
    }

    pub fn enqueue_status(&self, url: &str, status: u16) {
        self.queued
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(Scripted::Status(status, Vec::new()));
    }

    pub fn enqueue_error(&self, url: &str, message: &str) {
        self.queued
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(Scripted::Error(message.to_string()));
    }

    /// Panic inside `get` whenever `url` is requested.
    pub fn respond_panic(&self, url: &str, message: &str) {
        self.standing
            .lock()
            .unwrap()
            .insert(url.to_string(), Scripted::Panic(message.to_string()));
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = Some(latency);
    }

    /// Most exchanges that were open at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn calls(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|u| *u == url).count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn get(&self, url: &str) -> Result<TransportResponse> {
        self.calls.lock().unwrap().push(url.to_string());

        let queued = self
            .queued
            .lock()
            .unwrap()
            .get_mut(url)
            .and_then(VecDeque::pop_front);
        let scripted = queued.or_else(|| self.standing.lock().unwrap().get(url).cloned());
        if let Some(Scripted::Panic(message)) = &scripted {
            panic!("{message}");
        }

        let latency = *self.latency.lock().unwrap();
        if let Some(latency) = latency {
            let open = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_in_flight.fetch_max(open, Ordering::SeqCst);
            tokio::time::sleep(latency).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }

        match scripted {
            Some(Scripted::Status(status, body)) => Ok(TransportResponse { status, body }),
            Some(Scripted::Error(message)) => Err(AppError::transport(url, message)),
            Some(Scripted::Panic(_)) | None => Ok(TransportResponse {
                status: 404,
                body: Vec::new(),
            }),
        }
    }
}

/// Config with no politeness delay and millisecond backoff.
pub fn fast_config() -> Config {
    let mut config = Config::default();
    config.rate_limit.requests_per_second = 10_000;
    config.rate_limit.per_host_requests_per_second = 10_000;
    config.rate_limit.polite_delay_ms = 0;
    config.rate_limit.backoff_initial_ms = 1;
    config.rate_limit.backoff_max_ms = 10;
    config.sources.doj_disclosures_base_url = "https://doj.example.gov/epstein".to_string();
    config.sources.court_records_base_url = "https://court.example.gov/records".to_string();
    config.sources.foia_base_url = "https://foia.example.gov/files".to_string();
    config
}

/// Build a zip archive from `(name, contents)` pairs. Names ending in `/`
/// become directory entries.
pub fn build_zip(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);

    for (name, contents) in entries {
        if name.ends_with('/') {
            writer.add_directory(*name, options).unwrap();
        } else {
            writer.start_file(*name, options).unwrap();
            writer.write_all(contents.as_bytes()).unwrap();
        }
    }

    writer.finish().unwrap().into_inner()
}

/// Scripted network plus in-memory stores, wired the way the orchestrator
/// wires the real ones.
pub struct Harness {
    pub config: Config,
    pub transport: Arc<ScriptedTransport>,
    pub catalog: Arc<MemoryCatalog>,
    pub blobs: Arc<MemoryBlobStore>,
    pub telemetry: Arc<MemoryTelemetry>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(fast_config())
    }

    pub fn with_config(config: Config) -> Self {
        Self {
            config,
            transport: Arc::new(ScriptedTransport::new()),
            catalog: Arc::new(MemoryCatalog::new()),
            blobs: Arc::new(MemoryBlobStore::new()),
            telemetry: Arc::new(MemoryTelemetry::new()),
        }
    }

    pub fn fetcher(&self) -> Arc<ResilientFetcher> {
        Arc::new(ResilientFetcher::new(
            self.transport.clone(),
            &self.config,
            self.telemetry.clone(),
        ))
    }

    pub fn pipeline(&self) -> ItemPipeline {
        ItemPipeline::new(
            self.fetcher(),
            self.catalog.clone(),
            self.blobs.clone(),
            self.telemetry.clone(),
            Arc::new(ActiveRuns::new()),
            self.config.storage.clone(),
        )
    }
}
