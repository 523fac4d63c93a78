//! Configuration constants and validation functions for the harvester.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{HarvesterError, Result};

/// Entry page of the national regulation database (全國法規資料庫).
pub const DEFAULT_ROOT_URL: &str = "https://law.moj.gov.tw/Law/LawSearchLaw.aspx";

/// Base URL that relative catalog and listing links are resolved against.
pub const DEFAULT_BASE_URL: &str = "https://law.moj.gov.tw/Law/";

/// Catalog entries whose name contains one of these are dropped with their subtree.
pub const DEPRECATED_KEYWORDS: &[&str] = &["廢止法規", "停止適用"];

/// HTTP timeout in seconds.
pub const HTTP_TIMEOUT_SECS: u64 = 30;

/// Default number of pages fetched concurrently.
///
/// Kept small; the regulation site throttles aggressive clients.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Default output directory.
pub const DEFAULT_OUTPUT_DIR: &str = "regulations";

/// Name of the run summary written to the output root.
pub const SUMMARY_FILE_NAME: &str = "crawl_summary.yaml";

/// Characters that cannot appear in a path segment on common filesystems.
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static UNSAFE_SEGMENT_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[/\\:*?"<>|\x00-\x1f\x7f]"#).expect("valid regex"));

/// Serialization format of regulation files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Pretty-printed JSON with 4-space indentation.
    #[default]
    Json,
    /// YAML document.
    Yaml,
}

impl OutputFormat {
    /// File extension without the leading dot.
    #[must_use]
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Yaml => "yaml",
        }
    }
}

/// Turn a display name into a single safe path segment.
///
/// Path separators, reserved and control characters become `_`; surrounding
/// whitespace and trailing dots are trimmed.
///
/// # Examples
/// ```
/// use regulation_harvester::config::sanitize_segment;
///
/// assert_eq!(sanitize_segment("  民法 ").unwrap(), "民法");
/// assert_eq!(sanitize_segment("A/B").unwrap(), "A_B");
/// assert!(sanitize_segment("..").is_err());
/// ```
pub fn sanitize_segment(name: &str) -> Result<String> {
    let replaced = UNSAFE_SEGMENT_CHARS.replace_all(name, "_");
    let cleaned = replaced.trim().trim_end_matches('.').trim_end();

    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        return Err(HarvesterError::InvalidPathSegment(name.to_string()));
    }

    Ok(cleaned.to_string())
}

/// Parse and validate an absolute URL.
pub fn parse_url(url: &str) -> Result<Url> {
    Url::parse(url).map_err(|source| HarvesterError::InvalidUrl {
        url: url.to_string(),
        source,
    })
}

/// Resolve a catalog or listing link against the base URL.
///
/// # Examples
/// ```
/// use regulation_harvester::config::{parse_url, resolve_link};
///
/// let base = parse_url("https://law.moj.gov.tw/Law/").unwrap();
/// assert_eq!(
///     resolve_link(&base, "LawAll.aspx?pcode=B0000001").unwrap(),
///     "https://law.moj.gov.tw/Law/LawAll.aspx?pcode=B0000001"
/// );
/// ```
pub fn resolve_link(base: &Url, link: &str) -> Result<String> {
    base.join(link.trim())
        .map(String::from)
        .map_err(|source| HarvesterError::InvalidUrl {
            url: link.to_string(),
            source,
        })
}

/// Settings for one crawl run.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Page holding the catalog tree.
    pub root_url: String,
    /// Base for relative links.
    pub base_url: String,
    /// Directory mirrored from the catalog.
    pub output_root: PathBuf,
    /// Maximum number of tasks in flight.
    pub concurrency: usize,
    pub format: OutputFormat,
    /// Stop dispatching new tasks after this long.
    pub timeout: Option<Duration>,
    /// Names containing any of these are left out of the catalog.
    pub deprecated_keywords: Vec<String>,
}

impl CrawlConfig {
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self {
            root_url: DEFAULT_ROOT_URL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            output_root: output_root.into(),
            concurrency: DEFAULT_CONCURRENCY,
            format: OutputFormat::default(),
            timeout: None,
            deprecated_keywords: DEPRECATED_KEYWORDS.iter().map(|k| k.to_string()).collect(),
        }
    }

    pub fn with_root_url(mut self, root_url: impl Into<String>) -> Self {
        self.root_url = root_url.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Check the settings before any request is made.
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(HarvesterError::InvalidConcurrency(self.concurrency));
        }
        parse_url(&self.root_url)?;
        parse_url(&self.base_url)?;
        Ok(())
    }
}
