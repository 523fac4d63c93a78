//! Command-line interface for the harvester.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::{
    CrawlConfig, OutputFormat, DEFAULT_BASE_URL, DEFAULT_CONCURRENCY, DEFAULT_OUTPUT_DIR,
    DEFAULT_ROOT_URL,
};
use crate::crawler::{CrawlSummary, Crawler};
use crate::error::{HarvesterError, Result};
use crate::http::HttpFetcher;
use crate::logging;

/// Regulation Harvester - Mirror the Taiwanese national regulation database.
#[derive(Parser)]
#[command(name = "regulation-harvester")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Append warnings and errors to this file
    #[arg(long, global = true)]
    pub error_log: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Where to crawl from and where to write.
#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    /// Page holding the category tree
    #[arg(long, default_value = DEFAULT_ROOT_URL)]
    pub root_url: String,

    /// Base for relative links
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Output directory
    #[arg(short, long, default_value = DEFAULT_OUTPUT_DIR)]
    pub output: PathBuf,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Crawl the catalog and write one file per regulation.
    Crawl {
        #[command(flatten)]
        source: SourceArgs,

        /// Maximum number of pages fetched at once
        #[arg(short = 'j', long, default_value_t = DEFAULT_CONCURRENCY)]
        concurrency: usize,

        /// Output file format
        #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,

        /// Stop dispatching new pages after this many seconds
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Print the planned fetch tasks without writing anything.
    Plan {
        #[command(flatten)]
        source: SourceArgs,
    },
}

/// Run the CLI.
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.error_log.as_deref())?;

    match cli.command {
        Commands::Crawl {
            source,
            concurrency,
            format,
            timeout,
        } => {
            let config = crawl_config(&source)
                .with_concurrency(concurrency)
                .with_format(format)
                .with_timeout(timeout.map(Duration::from_secs));
            crawl_command(config)
        }
        Commands::Plan { source } => plan_command(crawl_config(&source)),
    }
}

fn crawl_config(source: &SourceArgs) -> CrawlConfig {
    CrawlConfig::new(&source.output)
        .with_root_url(&source.root_url)
        .with_base_url(&source.base_url)
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(HarvesterError::Runtime)
}

/// Execute the crawl command.
fn crawl_command(config: CrawlConfig) -> Result<()> {
    // Validate inputs before making HTTP requests
    config.validate()?;

    println!(
        "{} {} into {}",
        style("Crawling").bold(),
        style(&config.root_url).cyan(),
        style(config.output_root().display()).green()
    );
    println!();

    // The blocking client must be created and dropped outside the runtime
    let fetcher = HttpFetcher::new()?;
    let output_root = config.output_root.clone();

    let pb = ProgressBar::new(0);
    #[allow(clippy::expect_used)] // Static template string that is guaranteed to be valid
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .expect("valid template"),
    );
    pb.enable_steady_tick(Duration::from_millis(100));

    let crawler = Crawler::new(config, fetcher).with_progress(pb.clone());
    let cancel = crawler.cancellation_token();

    let result = runtime()?.block_on(async {
        let signal_cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Received SIGINT, finishing in-flight tasks");
                signal_cancel.cancel();
            }
        });
        crawler.crawl().await
    });
    pb.finish_and_clear();
    drop(crawler);

    let summary = result?;
    print_summary(&summary, &output_root);
    Ok(())
}

fn print_summary(summary: &CrawlSummary, output_root: &Path) {
    println!("  Saved: {}", style(summary.succeeded).green().bold());
    if summary.failed > 0 {
        println!("  Failed: {}", style(summary.failed).red().bold());
        for failure in &summary.errors {
            println!(
                "    {} {} ({})",
                style("-").dim(),
                failure.regulation_name,
                failure.reason
            );
        }
    }
    if summary.skipped > 0 {
        println!("  Skipped: {}", style(summary.skipped).yellow().bold());
    }
    if summary.row_warnings > 0 {
        println!("  Row warnings: {}", style(summary.row_warnings).yellow());
    }

    println!();
    println!(
        "{} {}",
        style("Output in:").green().bold(),
        output_root.display()
    );
}

/// Execute the plan command.
fn plan_command(config: CrawlConfig) -> Result<()> {
    config.validate()?;
    let fetcher = HttpFetcher::new()?;

    let pb = ProgressBar::new_spinner();
    #[allow(clippy::expect_used)] // Static template string that is guaranteed to be valid
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .expect("valid template"),
    );
    pb.set_message("Fetching catalog...");
    pb.enable_steady_tick(Duration::from_millis(100));

    let crawler = Crawler::new(config, fetcher);
    let result = runtime()?.block_on(crawler.plan());
    pb.finish_and_clear();
    drop(crawler);

    let (catalog, tasks) = result?;
    println!(
        "{} {} categories, {} leaves",
        style("Catalog:").bold(),
        catalog.category_count(),
        catalog.leaf_count()
    );
    println!();
    for task in &tasks {
        println!(
            "  {} {}",
            style(task.storage_dir.display()).green(),
            style(&task.url).cyan()
        );
    }
    println!();
    println!("{} fetch tasks planned", style(tasks.len()).bold());
    Ok(())
}
