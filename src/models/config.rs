//! Application configuration structures.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// HTTP client settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Rate limiting, politeness and retry settings
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Circuit breaker settings
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,

    /// Worker pool settings
    #[serde(default)]
    pub concurrency: ConcurrencyConfig,

    /// Blob storage settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// Remote source locations and enumeration bounds
    #[serde(default)]
    pub sources: SourcesConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.http.user_agent.trim().is_empty() {
            return Err(AppError::validation("http.user_agent is empty"));
        }
        if self.http.timeout_secs == 0 {
            return Err(AppError::validation("http.timeout_secs must be > 0"));
        }
        if self.rate_limit.requests_per_second == 0 {
            return Err(AppError::validation(
                "rate_limit.requests_per_second must be > 0",
            ));
        }
        if self.rate_limit.per_host_requests_per_second == 0 {
            return Err(AppError::validation(
                "rate_limit.per_host_requests_per_second must be > 0",
            ));
        }
        if self.rate_limit.backoff_initial_ms == 0 {
            return Err(AppError::validation(
                "rate_limit.backoff_initial_ms must be > 0",
            ));
        }
        if self.rate_limit.backoff_initial_ms > self.rate_limit.backoff_max_ms {
            return Err(AppError::validation(
                "rate_limit.backoff_initial_ms must not exceed backoff_max_ms",
            ));
        }
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(AppError::validation(
                "circuit_breaker.failure_threshold must be > 0",
            ));
        }
        if self.concurrency.max_concurrent_runs == 0 {
            return Err(AppError::validation(
                "concurrency.max_concurrent_runs must be > 0",
            ));
        }
        if self.storage.prefix.trim().is_empty() {
            return Err(AppError::validation("storage.prefix is empty"));
        }
        for (name, url) in [
            ("doj_disclosures_base_url", &self.sources.doj_disclosures_base_url),
            ("court_records_base_url", &self.sources.court_records_base_url),
            ("foia_base_url", &self.sources.foia_base_url),
        ] {
            url::Url::parse(url)
                .map_err(|e| AppError::validation(format!("sources.{name} is invalid: {e}")))?;
        }
        if self.sources.max_listing_pages == 0 {
            return Err(AppError::validation(
                "sources.max_listing_pages must be > 0",
            ));
        }
        Ok(())
    }
}

/// HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Connect timeout in seconds
    #[serde(default = "defaults::connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            connect_timeout_secs: defaults::connect_timeout(),
        }
    }
}

/// Admission control and retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Global token refill rate (and bucket capacity)
    #[serde(default = "defaults::requests_per_second")]
    pub requests_per_second: u32,

    /// Per-host token refill rate (and bucket capacity)
    #[serde(default = "defaults::requests_per_second")]
    pub per_host_requests_per_second: u32,

    /// Minimum spacing between two requests to the same host
    #[serde(default = "defaults::polite_delay")]
    pub polite_delay_ms: u64,

    /// First retry delay before jitter
    #[serde(default = "defaults::backoff_initial")]
    pub backoff_initial_ms: u64,

    /// Upper bound for a single retry delay
    #[serde(default = "defaults::backoff_max")]
    pub backoff_max_ms: u64,

    /// Retries allowed per fetch on transient failures
    #[serde(default = "defaults::max_retries")]
    pub max_retries: u32,
}

impl RateLimitConfig {
    pub fn polite_delay(&self) -> Duration {
        Duration::from_millis(self.polite_delay_ms)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: defaults::requests_per_second(),
            per_host_requests_per_second: defaults::requests_per_second(),
            polite_delay_ms: defaults::polite_delay(),
            backoff_initial_ms: defaults::backoff_initial(),
            backoff_max_ms: defaults::backoff_max(),
            max_retries: defaults::max_retries(),
        }
    }
}

/// Circuit breaker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit
    #[serde(default = "defaults::failure_threshold")]
    pub failure_threshold: u32,

    /// Time the circuit stays open before a probe is allowed
    #[serde(default = "defaults::cooldown")]
    pub cooldown_ms: u64,
}

impl CircuitBreakerConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: defaults::failure_threshold(),
            cooldown_ms: defaults::cooldown(),
        }
    }
}

/// Worker pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    /// Maximum number of runs executing at once
    #[serde(default = "defaults::max_concurrent_runs")]
    pub max_concurrent_runs: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            max_concurrent_runs: defaults::max_concurrent_runs(),
        }
    }
}

/// Blob storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory for local blobs and the local catalog
    #[serde(default = "defaults::root_dir")]
    pub root_dir: String,

    /// S3 bucket (used with the `s3` feature)
    #[serde(default = "defaults::bucket")]
    pub bucket: String,

    /// Key prefix for raw documents
    #[serde(default = "defaults::prefix")]
    pub prefix: String,
}

impl StorageConfig {
    /// Storage key for a document: `{prefix}/{data_set}/{file_name}`.
    pub fn document_key(&self, data_set: &str, file_name: &str) -> String {
        format!(
            "{}/{}/{}",
            self.prefix.trim_end_matches('/'),
            data_set,
            file_name
        )
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root_dir: defaults::root_dir(),
            bucket: defaults::bucket(),
            prefix: defaults::prefix(),
        }
    }
}

/// Remote source locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    #[serde(default = "defaults::doj_disclosures_base_url")]
    pub doj_disclosures_base_url: String,

    #[serde(default = "defaults::court_records_base_url")]
    pub court_records_base_url: String,

    #[serde(default = "defaults::foia_base_url")]
    pub foia_base_url: String,

    /// Highest docket number enumerated for court records
    #[serde(default = "defaults::max_docket")]
    pub max_docket: u32,

    /// Sub-part suffixes enumerated after the highest docket
    #[serde(default = "defaults::sub_parts")]
    pub sub_parts: u32,

    /// Number of FOIA record files
    #[serde(default = "defaults::foia_record_count")]
    pub foia_record_count: u32,

    /// Hard stop for paginated listings
    #[serde(default = "defaults::max_listing_pages")]
    pub max_listing_pages: u32,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            doj_disclosures_base_url: defaults::doj_disclosures_base_url(),
            court_records_base_url: defaults::court_records_base_url(),
            foia_base_url: defaults::foia_base_url(),
            max_docket: defaults::max_docket(),
            sub_parts: defaults::sub_parts(),
            foia_record_count: defaults::foia_record_count(),
            max_listing_pages: defaults::max_listing_pages(),
        }
    }
}

mod defaults {
    // HTTP defaults
    pub fn user_agent() -> String {
        "Ingestor/1.0 (Government FOIA Document Archival)".into()
    }
    pub fn timeout() -> u64 {
        60
    }
    pub fn connect_timeout() -> u64 {
        30
    }

    // Rate limit defaults
    pub fn requests_per_second() -> u32 {
        5
    }
    pub fn polite_delay() -> u64 {
        200
    }
    pub fn backoff_initial() -> u64 {
        2_000
    }
    pub fn backoff_max() -> u64 {
        120_000
    }
    pub fn max_retries() -> u32 {
        5
    }

    // Circuit breaker defaults
    pub fn failure_threshold() -> u32 {
        10
    }
    pub fn cooldown() -> u64 {
        300_000
    }

    pub fn max_concurrent_runs() -> usize {
        3
    }

    // Storage defaults
    pub fn root_dir() -> String {
        "storage".into()
    }
    pub fn bucket() -> String {
        "ingestor-documents".into()
    }
    pub fn prefix() -> String {
        "raw".into()
    }

    // Source defaults
    pub fn doj_disclosures_base_url() -> String {
        "https://www.justice.gov/epstein/doj-disclosures".into()
    }
    pub fn court_records_base_url() -> String {
        "https://www.justice.gov/epstein/court-records".into()
    }
    pub fn foia_base_url() -> String {
        "https://www.justice.gov/epstein/foia".into()
    }
    pub fn max_docket() -> u32 {
        1334
    }
    pub fn sub_parts() -> u32 {
        5
    }
    pub fn foia_record_count() -> u32 {
        4
    }
    pub fn max_listing_pages() -> u32 {
        1_000
    }
}
