//! Regulation Harvester - Mirror the Taiwanese national regulation database.
//!
//! This crate crawls the category tree of the national regulation database,
//! recreates it as a directory hierarchy, and writes every regulation as a
//! nested chapter / section / article document.
//!
//! # Example
//!
//! ```
//! use regulation_harvester::config::{sanitize_segment, CrawlConfig};
//!
//! assert_eq!(sanitize_segment("行政").unwrap(), "行政");
//! assert!(CrawlConfig::new("regulations").with_concurrency(8).validate().is_ok());
//! ```
//!
//! # Architecture
//!
//! The harvester is organized into several modules:
//!
//! - [`config`]: Constants, run settings and path-segment sanitizing
//! - [`error`]: Error types and Result alias
//! - [`types`]: Catalog tree, tasks and the nested regulation body
//! - [`markup`]: HTML queries over catalog, listing and regulation pages
//! - [`catalog`]: Catalog building, directory mirror and task planning
//! - [`listing`]: Listing pages to document tasks
//! - [`extract`]: Folding body rows into the nested structure
//! - [`output`]: JSON/YAML regulation files
//! - [`http`]: Fetcher trait and HTTP client
//! - [`crawler`]: Bounded concurrent crawl with run summary
//! - [`logging`]: Console and error-log output
//! - [`cli`]: Command-line interface

pub mod catalog;
pub mod cli;
pub mod config;
pub mod crawler;
pub mod error;
pub mod extract;
pub mod http;
pub mod listing;
pub mod logging;
pub mod markup;
pub mod output;
pub mod types;

// Re-export commonly used items
pub use config::{CrawlConfig, OutputFormat};
pub use crawler::{crawl, CrawlSummary, Crawler, TaskFailure};
pub use error::{ErrorKind, HarvesterError, Result};
pub use http::{FetchedPage, Fetcher, HttpFetcher};
pub use types::{CatalogNode, DocumentTask, FetchTask, RegulationBody, RegulationRow};
