//! Command-line interface definitions for the news pipeline.
//!
//! One subcommand per stage plus `run` for the orchestrator. The global
//! options override the YAML config and can also be set through environment
//! variables; `run` forwards them to every stage it spawns.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::PipelineConfig;
use crate::stages::ExtractMode;

/// Command-line arguments for the news pipeline.
///
/// # Examples
///
/// ```sh
/// # Full run with the default policy
/// news_pipeline run
///
/// # One stage with a different data directory
/// news_pipeline --data-dir /var/lib/news transform
///
/// # Look at the cleaned batch without touching the network
/// news_pipeline extract --view-only --clean
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to a YAML config file
    #[arg(short, long, global = true, env = "NEWS_PIPELINE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory holding the raw/clean CSV files and the database
    #[arg(long, global = true, env = "NEWS_PIPELINE_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Directory holding the pipeline and delivery logs
    #[arg(long, global = true, env = "NEWS_PIPELINE_LOGS_DIR")]
    pub logs_dir: Option<PathBuf>,

    /// Digest recipient; repeat (or comma-separate) for several. Replaces the configured list
    #[arg(
        long = "recipient",
        global = true,
        env = "NEWS_PIPELINE_RECIPIENTS",
        value_delimiter = ','
    )]
    pub recipients: Vec<String>,

    /// Authorized-user credential file for the mail transport
    #[arg(long, global = true, env = "NEWS_PIPELINE_TOKEN")]
    pub token_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Scrape the listing page into the raw store
    Extract {
        /// Only extract articles without viewing
        #[arg(long)]
        extract_only: bool,

        /// Only view existing articles
        #[arg(long)]
        view_only: bool,

        /// With --view-only, show the cleaned store instead of the raw one
        #[arg(long, requires = "view_only")]
        clean: bool,
    },
    /// Normalize and deduplicate the raw store into the clean store
    Transform,
    /// Append the clean store to the database
    Load,
    /// Email the digest of the newest articles
    Deliver,
    /// Run every stage in order as child processes
    Run {
        /// Attempt every stage even after an upstream failure
        #[arg(long)]
        continue_on_failure: bool,
    },
}

/// Map the `extract` flags to a mode; `--view-only` wins over fetching.
pub fn extract_mode(extract_only: bool, view_only: bool, clean: bool) -> ExtractMode {
    match (extract_only, view_only) {
        (_, true) => ExtractMode::ViewOnly { clean },
        (true, false) => ExtractMode::FetchOnly,
        (false, false) => ExtractMode::FetchAndView,
    }
}

impl Command {
    /// Whether this command creates or appends to files under the data or
    /// logs directories.
    pub fn writes_artifacts(&self) -> bool {
        !matches!(self, Command::Extract { view_only: true, .. })
    }
}

impl Cli {
    /// Apply command-line overrides on top of a loaded config.
    pub fn apply(&self, config: &mut PipelineConfig) {
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        if let Some(dir) = &self.logs_dir {
            config.logs_dir = dir.clone();
        }
        if !self.recipients.is_empty() {
            config.recipients = self.recipients.clone();
        }
        if let Some(path) = &self.token_path {
            config.token_path = path.clone();
        }
        if let Command::Run {
            continue_on_failure: true,
        } = self.command
        {
            config.continue_on_failure();
        }
    }

    /// Global options to hand to a stage child process, ahead of its subcommand.
    pub fn child_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        let mut push_path = |flag: &str, path: &Option<PathBuf>| {
            if let Some(path) = path {
                args.push(flag.to_string());
                args.push(path.display().to_string());
            }
        };
        push_path("--config", &self.config);
        push_path("--data-dir", &self.data_dir);
        push_path("--logs-dir", &self.logs_dir);
        push_path("--token-path", &self.token_path);
        if !self.recipients.is_empty() {
            args.push("--recipient".to_string());
            args.push(self.recipients.join(","));
        }
        args
    }
}
