//! # News Pipeline
//!
//! A scheduled ETL pipeline that scrapes a news listing page (the Hacker News
//! front page by default), normalizes and deduplicates the records, appends
//! them to a local SQLite table, and emails an HTML digest of the newest
//! entries.
//!
//! ## Features
//!
//! - Connectivity preflight and fixed-backoff retry for the fetch
//! - Two-tier date parsing with fallback to the scrape time
//! - Deduplication on `(title, publish date)`
//! - Append-only SQLite storage
//! - Per-recipient isolated email delivery with an audit log
//! - Per-stage failure policy, timeout, and cancellation
//!
//! ## Usage
//!
//! ```sh
//! news_pipeline run
//! news_pipeline extract --view-only
//! ```
//!
//! ## Architecture
//!
//! The `run` subcommand re-invokes this binary once per stage:
//! 1. **Extraction**: fetch the listing, write `data/articles_raw.csv`
//! 2. **Transformation**: normalize dates, deduplicate, write `data/articles_clean.csv`
//! 3. **Loading**: append to `data/news_articles.db`
//! 4. **Delivery**: email the newest rows, log each recipient's outcome
//!
//! Stage outcomes go to `logs/pipeline_log.txt`, deliveries to
//! `logs/newsletter_log.txt`.

use clap::Parser;
use std::error::Error;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod audit;
mod cli;
mod config;
mod http;
mod models;
mod normalize;
mod notifier;
mod outputs;
mod pipeline;
mod scrapers;
mod stages;
mod store;
mod utils;

use cli::{Cli, Command};
use config::PipelineConfig;
use pipeline::StageStatus;
use utils::ensure_writable_dir;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();

    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");

    let mut config = PipelineConfig::load(args.config.as_deref())?;
    args.apply(&mut config);

    // Fail early if the artifact directories cannot be written.
    let writable_dirs = if args.command.writes_artifacts() {
        vec![&config.data_dir, &config.logs_dir]
    } else {
        Vec::new()
    };
    for dir in writable_dirs {
        if let Err(e) = ensure_writable_dir(dir).await {
            error!(
                path = %dir.display(),
                error = %e,
                "Directory is not writable (fix perms or choose a different path)"
            );
            return Err(e);
        }
    }

    let result = match &args.command {
        Command::Extract {
            extract_only,
            view_only,
            clean,
        } => stages::extract(&config, cli::extract_mode(*extract_only, *view_only, *clean)).await,
        Command::Transform => stages::transform(&config).map(|_| ()),
        Command::Load => stages::load(&config).map(|_| ()).map_err(Into::into),
        Command::Deliver => stages::deliver(&config).await,
        Command::Run { .. } => {
            info!(stages = ?config.stages, "news_pipeline run starting");
            let run = stages::run(&config, args.child_args()).await?;
            for stage in &run.stages {
                info!(
                    stage = %stage.name,
                    status = %stage.status,
                    started = %stage.start_time.format("%H:%M:%S"),
                    elapsed_s = stage.elapsed.as_secs_f64(),
                    "Stage result"
                );
            }
            if run.all_succeeded() {
                Ok(())
            } else {
                warn!(
                    failed = run.count(StageStatus::Failure),
                    timed_out = run.count(StageStatus::TimedOut),
                    skipped = run.count(StageStatus::Skipped),
                    cancelled = run.count(StageStatus::Cancelled),
                    "Pipeline run finished with unsuccessful stages"
                );
                Err("one or more stages did not succeed".into())
            }
        }
    };

    let elapsed = start_time.elapsed();
    match &result {
        Ok(()) => info!(
            command = ?args.command,
            elapsed_s = elapsed.as_secs_f64(),
            "news_pipeline finished"
        ),
        Err(e) => error!(
            command = ?args.command,
            elapsed_s = elapsed.as_secs_f64(),
            error = %e,
            "news_pipeline failed"
        ),
    }
    result
}
