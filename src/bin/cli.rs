//! Document ingestor CLI
//!
//! Starts ingestion runs and queries the local catalog.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use ingestor::{
    error::{AppError, Result},
    fetch::{ReqwestTransport, ResilientFetcher},
    models::{Config, Run, RunStatus},
    pipeline::RunOrchestrator,
    services::known_data_sets,
    storage::{BlobStore, CatalogStore, LocalBlobStore, LocalCatalog},
    telemetry::MemoryTelemetry,
};
use uuid::Uuid;

/// Resilient government document ingestor
#[derive(Parser, Debug)]
#[command(
    name = "ingestor",
    version,
    about = "Archive government document releases by content hash"
)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "ingestor.toml")]
    config: PathBuf,

    /// Storage directory (overrides `storage.root_dir`)
    #[arg(short, long)]
    storage_dir: Option<PathBuf>,

    /// Upload document bytes to S3 instead of the storage directory
    #[cfg(feature = "s3")]
    #[arg(long)]
    s3: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest one data set, or every data set, and wait for completion
    Start {
        /// Data set name, or `all`
        #[arg(short, long, default_value = "all")]
        data_set: String,
    },

    /// List runs, newest first
    Runs,

    /// Show a single run
    Run { id: Uuid },

    /// Show a page of a run's events, newest first
    Events {
        id: Uuid,

        #[arg(long, default_value_t = 0)]
        page: usize,

        #[arg(long, default_value_t = 50)]
        size: usize,
    },

    /// Show document totals and running runs
    Status,

    /// Validate the configuration file
    Validate,

    /// List every known data set
    DataSets,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

fn print_run(run: &Run) {
    println!(
        "{}  {:<14} {:<16} {:<9} {:>6.1}%  discovered={} downloaded={} failed={} skipped={}  started={}{}",
        run.id,
        run.data_set,
        run.source_type,
        run.status.as_str(),
        run.progress_percent(),
        run.total_discovered,
        run.downloaded,
        run.failed,
        run.skipped_duplicate,
        run.started_at.format("%Y-%m-%d %H:%M:%S"),
        run.completed_at
            .map(|t| format!(" completed={}", t.format("%Y-%m-%d %H:%M:%S")))
            .unwrap_or_default()
    );
}

#[cfg(feature = "s3")]
async fn blob_store(
    cli: &Cli,
    config: &Config,
    root: &std::path::Path,
) -> Result<Arc<dyn BlobStore>> {
    if cli.s3 {
        let store = ingestor::storage::S3BlobStore::from_env(&config.storage).await?;
        return Ok(Arc::new(store));
    }
    Ok(Arc::new(LocalBlobStore::new(root.join("blobs"))))
}

#[cfg(not(feature = "s3"))]
async fn blob_store(
    _cli: &Cli,
    _config: &Config,
    root: &std::path::Path,
) -> Result<Arc<dyn BlobStore>> {
    Ok(Arc::new(LocalBlobStore::new(root.join("blobs"))))
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Config::load_or_default(&cli.config);
    let root = cli
        .storage_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.storage.root_dir));
    let catalog = Arc::new(LocalCatalog::new(root.join("catalog")));

    match &cli.command {
        Command::Start { data_set } => {
            config.validate()?;

            let telemetry = Arc::new(MemoryTelemetry::new());
            let transport = Arc::new(ReqwestTransport::new(&config.http)?);
            let fetcher = Arc::new(ResilientFetcher::new(transport, &config, telemetry.clone()));
            let blobs = blob_store(&cli, &config, &root).await?;
            let orchestrator =
                RunOrchestrator::new(&config, fetcher, catalog, blobs, telemetry.clone());

            log::info!("Ingestor starting (storage: {})", root.display());
            if data_set == "all" {
                orchestrator.start_all().await?;
            } else {
                orchestrator.start(data_set).await?;
            }

            let finished = orchestrator.wait().await;
            for run in &finished {
                print_run(run);
            }

            let stats = telemetry.snapshot();
            log::info!(
                "Done: {} downloaded ({} bytes), {} failed, {} duplicates, {} HTTP requests",
                stats.downloaded,
                stats.bytes,
                stats.failed,
                stats.skipped_duplicate,
                stats.http_requests
            );

            let failed = finished
                .iter()
                .filter(|r| r.status == RunStatus::Failed)
                .count();
            if failed > 0 {
                log::warn!("{} of {} runs failed", failed, finished.len());
            }
        }

        Command::Runs => {
            let runs = catalog.list_runs().await?;
            if runs.is_empty() {
                log::info!("No runs recorded yet.");
            }
            for run in &runs {
                print_run(run);
            }
        }

        Command::Run { id } => {
            let Some(run) = catalog.get_run(*id).await? else {
                return Err(AppError::validation(format!("Run {id} not found")));
            };
            print_run(&run);
        }

        Command::Events { id, page, size } => {
            let events = catalog.list_events(*id, *page, (*size).max(1)).await?;
            for event in &events.items {
                println!(
                    "{}  {:<26} {}{}",
                    event.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    event.event_type.as_str(),
                    event
                        .source_url
                        .as_deref()
                        .map(|u| format!("{u}  "))
                        .unwrap_or_default(),
                    event.message
                );
            }
            log::info!(
                "Page {} of {} ({} events)",
                events.page + 1,
                events.total_pages().max(1),
                events.total
            );
        }

        Command::Status => {
            let total = catalog.count_documents().await?;
            let by_data_set = catalog.count_documents_by_data_set().await?;
            let running: Vec<Run> = catalog
                .list_runs()
                .await?
                .into_iter()
                .filter(|r| r.status == RunStatus::Running)
                .collect();

            println!("Documents: {total}");
            for (data_set, count) in &by_data_set {
                println!("  {data_set:<14} {count}");
            }
            println!("Running runs: {}", running.len());
            for run in &running {
                print_run(run);
            }
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            log::info!("Config OK ({})", cli.config.display());
        }

        Command::DataSets => {
            for data_set in known_data_sets() {
                println!("{data_set}");
            }
        }
    }

    Ok(())
}
