//! Crawl orchestration.
//!
//! A run fetches the catalog, mirrors it onto disk, plans one task per
//! catalog leaf, and then works through the tasks with a bounded number in
//! flight. Leaf pages are either regulation pages (saved directly) or
//! listings (fanned out into one document task per regulation). Every
//! per-task failure is logged and recorded in the [`CrawlSummary`]; only
//! setup failures end the run early.

use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use indicatif::ProgressBar;
use scraper::Html;
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::catalog::{build_catalog, ensure_dir, materialize, plan};
use crate::config::{parse_url, CrawlConfig, OutputFormat, SUMMARY_FILE_NAME};
use crate::error::{ErrorKind, HarvesterError, Result};
use crate::extract::{extract_body, ExtractContext};
use crate::http::{FetchedPage, Fetcher};
use crate::listing::resolve_listing;
use crate::markup::{
    attachment_count, catalog_root, document_title, page_shape, parse_page, regulation_rows,
    PageShape,
};
use crate::output::{regulation_path, write_atomic, write_regulation};
use crate::types::{CatalogNode, DocumentTask, FetchTask};

/// File used to check that the output root accepts writes.
const WRITE_PROBE_NAME: &str = ".write_probe";

/// One failed task, as reported in the run summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
    pub regulation_name: String,
    pub storage_dir: PathBuf,
    pub url: String,
    pub kind: ErrorKind,
    pub reason: String,
    pub at: DateTime<Utc>,
}

impl TaskFailure {
    fn new(regulation_name: &str, storage_dir: &Path, url: &str, error: &HarvesterError) -> Self {
        Self {
            regulation_name: regulation_name.to_string(),
            storage_dir: storage_dir.to_path_buf(),
            url: url.to_string(),
            kind: error.kind(),
            reason: error.to_string(),
            at: Utc::now(),
        }
    }
}

/// Outcome of a crawl run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlSummary {
    /// Regulations written.
    pub succeeded: usize,
    /// Tasks that failed; see `errors`.
    pub failed: usize,
    /// Tasks never dispatched because the run was cancelled or timed out.
    pub skipped: usize,
    /// Rows skipped during extraction across all written regulations.
    pub row_warnings: usize,
    pub errors: Vec<TaskFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl CrawlSummary {
    /// Whether the run stopped before every task was dispatched.
    #[must_use]
    pub fn is_partial(&self) -> bool {
        self.skipped > 0
    }
}

/// Unit of work handed to a worker.
#[derive(Debug)]
enum Job {
    Leaf(FetchTask),
    /// A listed regulation whose output file is already claimed.
    Document(DocumentTask),
}

impl Job {
    fn identity(&self) -> JobIdentity {
        match self {
            Self::Leaf(task) => JobIdentity {
                name: task.name.clone(),
                storage_dir: task.storage_dir.clone(),
                url: task.url.clone(),
            },
            Self::Document(task) => JobIdentity {
                name: task.regulation_name.clone(),
                storage_dir: task.storage_dir.clone(),
                url: task.url.clone(),
            },
        }
    }
}

/// What a failure report needs to know about a job.
#[derive(Debug)]
struct JobIdentity {
    name: String,
    storage_dir: PathBuf,
    url: String,
}

impl JobIdentity {
    fn failure(&self, error: &HarvesterError) -> TaskFailure {
        TaskFailure::new(&self.name, &self.storage_dir, &self.url, error)
    }
}

/// Output files written during one run, keyed by path, with the URL each
/// one belongs to.
#[derive(Debug, Default)]
struct FileClaims {
    claimed: Mutex<HashMap<PathBuf, String>>,
}

impl FileClaims {
    /// Claim `path` for `url`.
    ///
    /// Returns `false` when `url` already holds the claim and fails when a
    /// different URL does.
    fn claim(&self, path: &Path, url: &str) -> Result<bool> {
        let mut claimed = self.claimed.lock().unwrap_or_else(PoisonError::into_inner);
        match claimed.get(path) {
            Some(existing) if existing == url => Ok(false),
            Some(existing) => Err(HarvesterError::FileCollision {
                path: path.to_path_buf(),
                existing_url: existing.clone(),
            }),
            None => {
                claimed.insert(path.to_path_buf(), url.to_string());
                Ok(true)
            }
        }
    }
}

/// What a worker reports back.
#[derive(Debug)]
enum Outcome {
    Listing {
        source: FetchTask,
        documents: Vec<DocumentTask>,
    },
    Saved {
        path: PathBuf,
        warnings: usize,
    },
    Duplicate {
        regulation_name: String,
    },
    Failed(TaskFailure),
}

/// Runs crawls against a [`Fetcher`].
pub struct Crawler<F> {
    config: CrawlConfig,
    fetcher: Arc<F>,
    cancel: CancellationToken,
    progress: Option<ProgressBar>,
}

impl<F: Fetcher + 'static> Crawler<F> {
    pub fn new(config: CrawlConfig, fetcher: F) -> Self {
        Self {
            config,
            fetcher: Arc::new(fetcher),
            cancel: CancellationToken::new(),
            progress: None,
        }
    }

    /// Report finished tasks on a progress bar.
    #[must_use]
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Use an externally owned cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that stops dispatching when cancelled.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    #[must_use]
    pub fn config(&self) -> &CrawlConfig {
        &self.config
    }

    /// Fetch the root page and build the catalog tree.
    ///
    /// # Errors
    /// Fails when the root page cannot be fetched or has no catalog list.
    pub async fn fetch_catalog(&self) -> Result<CatalogNode> {
        let fetcher = Arc::clone(&self.fetcher);
        let root_url = self.config.root_url.clone();
        let keywords = self.config.deprecated_keywords.clone();

        run_blocking(move || {
            let page = fetcher.fetch(&root_url)?.into_success()?;
            let doc = parse_page(&page.body);
            let root = catalog_root(&doc)
                .ok_or_else(|| HarvesterError::MissingCatalog(root_url.clone()))?;
            Ok(build_catalog(&root, &keywords))
        })
        .await
    }

    /// Build the catalog and plan fetch tasks without touching the disk.
    pub async fn plan(&self) -> Result<(CatalogNode, Vec<FetchTask>)> {
        self.config.validate()?;
        let base_url = parse_url(&self.config.base_url)?;
        let catalog = self.fetch_catalog().await?;
        let tasks = plan(&catalog, &self.config.output_root, &base_url);
        Ok((catalog, tasks))
    }

    /// Run a full crawl.
    ///
    /// # Errors
    /// Only setup failures are returned: invalid configuration, an output
    /// root that is not writable, an unreachable root page, or a catalog
    /// that cannot be mirrored. Per-regulation failures end up in the
    /// summary instead.
    pub async fn crawl(&self) -> Result<CrawlSummary> {
        self.config.validate()?;
        let started_at = Utc::now();
        let base_url = parse_url(&self.config.base_url)?;
        let output_root = self.config.output_root.clone();

        let probe_root = output_root.clone();
        run_blocking(move || probe_output_root(&probe_root)).await?;

        let catalog = self.fetch_catalog().await?;
        tracing::info!(
            categories = catalog.category_count(),
            leaves = catalog.leaf_count(),
            "Catalog built"
        );

        // Every directory exists before the first task is dispatched.
        let mirror_root = output_root.clone();
        let plan_base = base_url.clone();
        let tasks = run_blocking(move || {
            materialize(&catalog, &mirror_root)?;
            Ok(plan(&catalog, &mirror_root, &plan_base))
        })
        .await?;
        tracing::info!(tasks = tasks.len(), "Fetch tasks planned");

        let mut summary = self.dispatch(tasks, base_url).await;
        summary.started_at = Some(started_at);
        summary.finished_at = Some(Utc::now());

        let summary_for_file = summary.clone();
        if let Err(e) = run_blocking(move || write_summary(&summary_for_file, &output_root)).await
        {
            tracing::warn!(error = %e, "Failed to write crawl summary");
        }

        tracing::info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped = summary.skipped,
            "Crawl finished"
        );
        Ok(summary)
    }

    /// Work through the queue with at most `concurrency` jobs in flight.
    async fn dispatch(&self, tasks: Vec<FetchTask>, base_url: Url) -> CrawlSummary {
        let mut summary = CrawlSummary::default();
        let mut queue: VecDeque<Job> = tasks.into_iter().map(Job::Leaf).collect();
        let claims = Arc::new(FileClaims::default());
        let mut in_flight: JoinSet<Outcome> = JoinSet::new();
        let deadline = self.config.timeout.map(|timeout| Instant::now() + timeout);
        let mut stopping = false;

        if let Some(pb) = &self.progress {
            pb.set_length(queue.len() as u64);
        }

        loop {
            if !stopping
                && (self.cancel.is_cancelled() || deadline.is_some_and(|d| Instant::now() >= d))
            {
                stopping = true;
                tracing::warn!(
                    pending = queue.len(),
                    in_flight = in_flight.len(),
                    "Crawl stopped, no further tasks will be dispatched"
                );
            }

            if stopping {
                summary.skipped += queue.len();
                queue.clear();
            }

            while in_flight.len() < self.config.concurrency {
                let Some(job) = queue.pop_front() else {
                    break;
                };
                let fetcher = Arc::clone(&self.fetcher);
                let claims = Arc::clone(&claims);
                let base_url = base_url.clone();
                let format = self.config.format;
                in_flight.spawn_blocking(move || {
                    let identity = job.identity();
                    panic::catch_unwind(AssertUnwindSafe(|| {
                        run_job(fetcher.as_ref(), &claims, job, &base_url, format)
                    }))
                    .unwrap_or_else(|payload| {
                        let error = HarvesterError::WorkerPanic(panic_message(payload.as_ref()));
                        Outcome::Failed(identity.failure(&error))
                    })
                });
            }

            if in_flight.is_empty() {
                break;
            }

            let stop_signal = async {
                match deadline {
                    Some(deadline) => {
                        tokio::select! {
                            _ = self.cancel.cancelled() => {}
                            _ = tokio::time::sleep_until(deadline) => {}
                        }
                    }
                    None => self.cancel.cancelled().await,
                }
            };

            let joined = tokio::select! {
                joined = in_flight.join_next() => joined,
                _ = stop_signal, if !stopping => continue,
            };

            match joined {
                Some(Ok(outcome)) => self.record(outcome, &mut queue, &claims, &mut summary),
                Some(Err(e)) => {
                    // Panics are caught inside the job, so only an aborted task gets here
                    let error = HarvesterError::from(e);
                    let failure = TaskFailure::new("", &self.config.output_root, "", &error);
                    self.fail(failure, &mut summary);
                    self.tick();
                }
                None => break,
            }
        }

        summary
    }

    fn record(
        &self,
        outcome: Outcome,
        queue: &mut VecDeque<Job>,
        claims: &FileClaims,
        summary: &mut CrawlSummary,
    ) {
        match outcome {
            Outcome::Listing { source, documents } => {
                if documents.is_empty() {
                    tracing::warn!(
                        storage_dir = %source.storage_dir.display(),
                        name = %source.name,
                        url = %source.url,
                        "Listing page has no regulations"
                    );
                }
                let mut added = 0u64;
                for document in documents {
                    match self.claim_document(&document, claims) {
                        Ok(true) => {
                            queue.push_back(Job::Document(document));
                            added += 1;
                        }
                        Ok(false) => tracing::debug!(
                            regulation_name = %document.regulation_name,
                            url = %document.url,
                            "Regulation already queued"
                        ),
                        Err(e) => {
                            let failure = TaskFailure::new(
                                &document.regulation_name,
                                &document.storage_dir,
                                &document.url,
                                &e,
                            );
                            self.fail(failure, summary);
                        }
                    }
                }
                if let Some(pb) = &self.progress {
                    pb.inc_length(added);
                }
            }
            Outcome::Saved { path, warnings } => {
                tracing::info!(path = %path.display(), warnings, "Regulation saved");
                summary.succeeded += 1;
                summary.row_warnings += warnings;
            }
            Outcome::Duplicate { regulation_name } => {
                tracing::debug!(regulation_name = %regulation_name, "Regulation already saved");
            }
            Outcome::Failed(failure) => self.fail(failure, summary),
        }
        self.tick();
    }

    /// Reserve a listed regulation's output file before it is queued.
    fn claim_document(&self, document: &DocumentTask, claims: &FileClaims) -> Result<bool> {
        let path = regulation_path(
            &document.storage_dir,
            &document.regulation_name,
            self.config.format,
        )?;
        claims.claim(&path, &document.url)
    }

    fn fail(&self, failure: TaskFailure, summary: &mut CrawlSummary) {
        tracing::error!(
            storage_dir = %failure.storage_dir.display(),
            regulation_name = %failure.regulation_name,
            url = %failure.url,
            error = %failure.reason,
            "Task failed"
        );
        summary.failed += 1;
        summary.errors.push(failure);
    }

    fn tick(&self) {
        if let Some(pb) = &self.progress {
            pb.inc(1);
        }
    }
}

/// Crawl `root_url` into `output_root` with default settings otherwise.
///
/// Relative links resolve against `root_url`.
pub async fn crawl<F: Fetcher + 'static>(
    fetcher: F,
    root_url: &str,
    output_root: impl Into<PathBuf>,
    concurrency: usize,
) -> Result<CrawlSummary> {
    let config = CrawlConfig::new(output_root)
        .with_root_url(root_url)
        .with_base_url(root_url)
        .with_concurrency(concurrency);
    Crawler::new(config, fetcher).crawl().await
}

/// Run blocking work on the blocking pool.
async fn run_blocking<T, C>(work: C) -> Result<T>
where
    T: Send + 'static,
    C: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work).await?
}

/// Create the output root if needed and check that it accepts files.
fn probe_output_root(root: &Path) -> Result<()> {
    ensure_dir(root)?;
    let probe = root.join(WRITE_PROBE_NAME);
    std::fs::write(&probe, b"").map_err(|e| HarvesterError::storage(&probe, e))?;
    std::fs::remove_file(&probe).map_err(|e| HarvesterError::storage(&probe, e))
}

fn write_summary(summary: &CrawlSummary, root: &Path) -> Result<()> {
    let content = format!("---\n{}", serde_yaml_ng::to_string(summary)?);
    let target = root.join(SUMMARY_FILE_NAME);
    let temp = root.join(format!(".{SUMMARY_FILE_NAME}.tmp"));
    write_atomic(&temp, &target, content.as_bytes())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

fn run_job<F: Fetcher + ?Sized>(
    fetcher: &F,
    claims: &FileClaims,
    job: Job,
    base_url: &Url,
    format: OutputFormat,
) -> Outcome {
    match job {
        Job::Leaf(task) => process_leaf(fetcher, claims, task, base_url, format),
        Job::Document(task) => process_document(fetcher, task, format),
    }
}

fn process_leaf<F: Fetcher + ?Sized>(
    fetcher: &F,
    claims: &FileClaims,
    task: FetchTask,
    base_url: &Url,
    format: OutputFormat,
) -> Outcome {
    let page = match fetcher.fetch(&task.url).and_then(FetchedPage::into_success) {
        Ok(page) => page,
        Err(e) => {
            return Outcome::Failed(TaskFailure::new(&task.name, &task.storage_dir, &task.url, &e))
        }
    };
    let doc = parse_page(&page.body);

    match page_shape(&doc) {
        PageShape::Listing => {
            let documents = resolve_listing(&task, &doc, base_url);
            Outcome::Listing {
                source: task,
                documents,
            }
        }
        PageShape::Document => {
            let document = DocumentTask {
                regulation_name: document_title(&doc).unwrap_or_else(|| task.name.clone()),
                url: task.url,
                storage_dir: task.storage_dir,
            };
            let claimed = regulation_path(&document.storage_dir, &document.regulation_name, format)
                .and_then(|path| claims.claim(&path, &document.url));
            match claimed {
                Ok(true) => save_document(&doc, &document, format),
                Ok(false) => Outcome::Duplicate {
                    regulation_name: document.regulation_name,
                },
                Err(e) => Outcome::Failed(TaskFailure::new(
                    &document.regulation_name,
                    &document.storage_dir,
                    &document.url,
                    &e,
                )),
            }
        }
        PageShape::Unknown => {
            let error = HarvesterError::MarkupShape {
                url: task.url.clone(),
                detail: "neither a regulation nor a listing page".to_string(),
            };
            Outcome::Failed(TaskFailure::new(&task.name, &task.storage_dir, &task.url, &error))
        }
    }
}

fn process_document<F: Fetcher + ?Sized>(
    fetcher: &F,
    task: DocumentTask,
    format: OutputFormat,
) -> Outcome {
    match fetcher.fetch(&task.url).and_then(FetchedPage::into_success) {
        Ok(page) => {
            let doc = parse_page(&page.body);
            if page_shape(&doc) != PageShape::Document {
                tracing::debug!(
                    regulation_name = %task.regulation_name,
                    url = %task.url,
                    "Regulation page without body container"
                );
            }
            save_document(&doc, &task, format)
        }
        Err(e) => Outcome::Failed(TaskFailure::new(
            &task.regulation_name,
            &task.storage_dir,
            &task.url,
            &e,
        )),
    }
}

fn save_document(doc: &Html, task: &DocumentTask, format: OutputFormat) -> Outcome {
    let attachments = attachment_count(doc);
    if attachments > 0 {
        tracing::debug!(
            regulation_name = %task.regulation_name,
            attachments,
            "Regulation has attachments, not downloaded"
        );
    }

    let rows = regulation_rows(doc);
    let extraction = extract_body(
        &rows,
        ExtractContext {
            regulation_name: &task.regulation_name,
            storage_dir: &task.storage_dir,
        },
    );

    match write_regulation(
        &extraction.body,
        &task.storage_dir,
        &task.regulation_name,
        format,
    ) {
        Ok(path) => Outcome::Saved {
            path,
            warnings: extraction.warning_count(),
        },
        Err(e) => Outcome::Failed(TaskFailure::new(
            &task.regulation_name,
            &task.storage_dir,
            &task.url,
            &e,
        )),
    }
}
