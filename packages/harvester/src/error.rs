//! Error types for the harvester.
//!
//! Uses the dual-error pattern: `HarvesterError` for library consumers
//! with detailed error context, and [`ErrorKind`] for the crawler's
//! per-task bookkeeping.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the harvester library.
#[derive(Debug, Error)]
pub enum HarvesterError {
    /// A configured URL could not be parsed.
    #[error("Invalid URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// Concurrency limit outside the accepted range.
    #[error("Invalid concurrency limit: {0}. Expected at least 1")]
    InvalidConcurrency(usize),

    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-success status.
    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    /// Transient failures persisted through every retry.
    #[error("Giving up after {attempts} attempts: {message}")]
    RetriesExhausted { attempts: u32, message: String },

    /// The root page has no catalog list.
    #[error("Catalog list not found on root page {0}")]
    MissingCatalog(String),

    /// A page matched none of the known page shapes.
    #[error("Unrecognized page shape at {url}: {detail}")]
    MarkupShape { url: String, detail: String },

    /// A display name cannot be used as a path segment.
    #[error("Name cannot be used as a path segment: '{0}'")]
    InvalidPathSegment(String),

    /// Two regulations resolve to the same output file.
    #[error("Output file {} already belongs to {existing_url}", path.display())]
    FileCollision { path: PathBuf, existing_url: String },

    /// Directory or file operation failed.
    #[error("Storage error at {}: {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization error.
    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization error.
    #[error("YAML serialization failed: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    /// A worker task panicked or was aborted.
    #[error("Worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// A worker panicked while processing a task.
    #[error("Worker panicked: {0}")]
    WorkerPanic(String),

    /// The async runtime could not be started.
    #[error("Failed to start runtime: {0}")]
    Runtime(#[source] std::io::Error),

    /// Log output could not be set up.
    #[error("Failed to initialize logging: {0}")]
    Logging(String),
}

impl HarvesterError {
    /// Wrap an IO error with the path it occurred on.
    pub fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }

    /// Classify this error for run bookkeeping.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidUrl { .. }
            | Self::InvalidConcurrency(_)
            | Self::Join(_)
            | Self::WorkerPanic(_)
            | Self::Runtime(_)
            | Self::Logging(_) => ErrorKind::Config,
            Self::Http(_) | Self::Status { .. } | Self::RetriesExhausted { .. } => {
                ErrorKind::Fetch
            }
            Self::MissingCatalog(_) | Self::MarkupShape { .. } => ErrorKind::MarkupShape,
            Self::InvalidPathSegment(_)
            | Self::FileCollision { .. }
            | Self::Storage { .. }
            | Self::Json(_)
            | Self::Yaml(_) => ErrorKind::Storage,
        }
    }
}

/// Coarse error classification used in the run summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Network or status failure for one task.
    Fetch,
    /// A page's structure matched no recognized pattern.
    MarkupShape,
    /// Directory or file write failure.
    Storage,
    /// Invalid setup or an internal failure.
    Config,
}

/// Result type alias for harvester operations.
pub type Result<T> = std::result::Result<T, HarvesterError>;
