//! Log output setup.
//!
//! Console output follows `RUST_LOG` and defaults to warnings. An optional
//! error log receives every warning and error as plain text, appended across
//! runs.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::error::{HarvesterError, Result};

/// Filter used when `RUST_LOG` is unset or invalid.
const DEFAULT_FILTER: &str = "warn";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber.
///
/// # Errors
/// Fails when the error log cannot be opened or a subscriber is already set.
pub fn init(error_log: Option<&Path>) -> Result<()> {
    let console = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(env_filter());

    let error_file = match error_log {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| HarvesterError::storage(path, e))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Mutex::new(file))
                    .with_filter(LevelFilter::WARN),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console)
        .with(error_file)
        .try_init()
        .map_err(|e| HarvesterError::Logging(e.to_string()))
}
