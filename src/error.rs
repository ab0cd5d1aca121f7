// src/error.rs

//! Unified error handling for the ingestor.

use std::fmt;

use thiserror::Error;

/// Result type alias for ingestor operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client could not be built or used
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// ZIP archive could not be read
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Remote server answered with a non-success status
    #[error("HTTP {status} for URL: {url}")]
    HttpStatus { status: u16, url: String },

    /// Connection, timeout or body read failure
    #[error("Transport error for {url}: {message}")]
    Transport { url: String, message: String },

    /// Request rejected locally because the circuit breaker is open
    #[error("Circuit breaker is OPEN for URL: {url}")]
    CircuitOpen { url: String },

    /// URL has no host to rate limit against
    #[error("Invalid URL '{0}'")]
    InvalidUrl(String),

    /// Listing or archive discovery failed
    #[error("Discovery error: {0}")]
    Discovery(String),

    /// Blob storage write failed
    #[error("Storage error for {key}: {message}")]
    Storage { key: String, message: String },

    /// Catalog (runs, documents, events) read or write failed
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// A document with this content hash is already registered
    #[error("Document with hash {0} already exists")]
    DuplicateDocument(String),

    /// Data set name is not routed to any source
    #[error("Unknown data set: {0}")]
    UnknownDataSet(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// A run's worker stopped abnormally
    #[error("Run aborted: {0}")]
    Aborted(String),
}

impl AppError {
    /// Create a transport error for a URL.
    pub fn transport(url: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Transport {
            url: url.into(),
            message: message.to_string(),
        }
    }

    /// Create a blob storage error.
    pub fn storage(key: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Storage {
            key: key.into(),
            message: message.to_string(),
        }
    }

    /// Create a catalog error.
    pub fn catalog(message: impl fmt::Display) -> Self {
        Self::Catalog(message.to_string())
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a discovery error.
    pub fn discovery(message: impl Into<String>) -> Self {
        Self::Discovery(message.into())
    }

    /// Whether the failure is worth retrying under the backoff budget.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::HttpStatus { status, .. } => matches!(status, 429 | 503),
            Self::Transport { .. } => true,
            _ => false,
        }
    }

    /// Whether the remote answered 404.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::HttpStatus { status: 404, .. })
    }
}
