//! Run lifecycle and the bounded worker pool.
//!
//! `start` records a RUNNING run and hands it to a spawned worker; the worker
//! waits for a pool permit, executes the strategy, and always finalizes the
//! run (terminal status, completion time, summary event) however the strategy
//! ended.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::error::{AppError, Result};
use crate::fetch::ResilientFetcher;
use crate::models::{Config, Event, EventType, Run, RunStatus};
use crate::pipeline::item::ItemPipeline;
use crate::pipeline::registry::ActiveRuns;
use crate::services::{SourceKind, StrategyRegistry, known_data_sets, resolve_source};
use crate::storage::{BlobStore, CatalogStore};
use crate::telemetry::Telemetry;

/// Everything a worker needs, detached from the orchestrator's lifetime.
#[derive(Clone)]
struct RunWorker {
    strategies: Arc<StrategyRegistry>,
    pipeline: Arc<ItemPipeline>,
    active: Arc<ActiveRuns>,
    workers: Arc<Semaphore>,
    telemetry: Arc<dyn Telemetry>,
}

impl RunWorker {
    async fn run(self, mut run: Run, kind: SourceKind) -> Run {
        // The semaphore is never closed, so a permit always arrives.
        let _permit = self.workers.clone().acquire_owned().await.ok();
        log::info!(
            "[{}] [{}] Executing with {} strategy",
            run.id,
            run.data_set,
            kind
        );

        let result = match self.strategies.get(kind) {
            Ok(strategy) => AssertUnwindSafe(strategy.execute(&self.pipeline, &mut run))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(AppError::Aborted(panic_message(panic.as_ref())))),
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                run.finish(RunStatus::Completed);
                log::info!(
                    "[{}] [{}] Completed: downloaded={}, failed={}, skipped={}, discovered={}",
                    run.id,
                    run.data_set,
                    run.downloaded,
                    run.failed,
                    run.skipped_duplicate,
                    run.total_discovered
                );
            }
            Err(e) => {
                run.finish(RunStatus::Failed);
                log::error!("[{}] [{}] Run failed: {}", run.id, run.data_set, e);
                self.pipeline
                    .record_event(Event::new(
                        run.id,
                        EventType::IngestionRunFailed,
                        None,
                        e.to_string(),
                    ))
                    .await;
            }
        }

        self.pipeline.persist_run(&run).await;
        self.active.remove(run.id);

        let elapsed_secs = run
            .completed_at
            .map(|end| (end - run.started_at).num_seconds())
            .unwrap_or(0);
        self.pipeline
            .record_event(Event::new(
                run.id,
                EventType::IngestionRunCompleted,
                None,
                format!(
                    "Duration: {}s, Downloaded: {}, Failed: {}, Skipped: {}",
                    elapsed_secs, run.downloaded, run.failed, run.skipped_duplicate
                ),
            ))
            .await;
        self.telemetry.run_progress(&run.data_set, 100.0);
        run
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "worker panicked".to_string()
    }
}

/// Entry point for starting and observing ingestion runs.
pub struct RunOrchestrator {
    catalog: Arc<dyn CatalogStore>,
    worker: RunWorker,
    submitted: Mutex<Vec<JoinHandle<Run>>>,
}

impl RunOrchestrator {
    pub fn new(
        config: &Config,
        fetcher: Arc<ResilientFetcher>,
        catalog: Arc<dyn CatalogStore>,
        blobs: Arc<dyn BlobStore>,
        telemetry: Arc<dyn Telemetry>,
    ) -> Self {
        let active = Arc::new(ActiveRuns::new());
        let pipeline = Arc::new(ItemPipeline::new(
            fetcher,
            Arc::clone(&catalog),
            blobs,
            Arc::clone(&telemetry),
            Arc::clone(&active),
            config.storage.clone(),
        ));

        Self {
            catalog,
            worker: RunWorker {
                strategies: Arc::new(StrategyRegistry::new(&config.sources)),
                pipeline,
                active,
                workers: Arc::new(Semaphore::new(config.concurrency.max_concurrent_runs.max(1))),
                telemetry,
            },
            submitted: Mutex::new(Vec::new()),
        }
    }

    /// Start a run for `data_set` and return it while it is still RUNNING.
    pub async fn start(&self, data_set: &str) -> Result<Run> {
        let kind = resolve_source(data_set)?;
        let run = Run::new(data_set, kind.tag());

        self.catalog.save_run(&run).await?;
        self.worker.active.insert(run.clone());
        self.worker
            .pipeline
            .record_event(Event::new(
                run.id,
                EventType::IngestionRunStarted,
                None,
                format!("Starting ingestion for {} using {}", data_set, kind),
            ))
            .await;
        log::info!("[{}] [{}] Run submitted", run.id, run.data_set);

        let handle = tokio::spawn(self.worker.clone().run(run.clone(), kind));
        self.submitted
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(handle);
        Ok(run)
    }

    /// Start one run per known data set, in sorted order.
    pub async fn start_all(&self) -> Result<Vec<Run>> {
        let mut runs = Vec::new();
        for data_set in known_data_sets() {
            runs.push(self.start(&data_set).await?);
        }
        Ok(runs)
    }

    /// Snapshots of runs submitted and not yet finalized.
    pub fn active_runs(&self) -> Vec<Run> {
        self.worker.active.snapshot()
    }

    /// Wait for every run submitted so far and return their final state.
    pub async fn wait(&self) -> Vec<Run> {
        let handles = std::mem::take(
            &mut *self
                .submitted
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        );

        let mut finished = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(run) => finished.push(run),
                Err(e) => log::error!("Run worker terminated abnormally: {}", e),
            }
        }
        finished
    }
}
