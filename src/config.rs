//! Pipeline configuration.
//!
//! Settings come from an optional YAML file; anything the file omits keeps
//! its default. Command-line flags are applied on top by [`crate::cli`].
//!
//! ```yaml
//! source_url: https://news.ycombinator.com
//! recipients:
//!   - reader@example.com
//! digest_limit: 10
//! stages:
//!   transformation:
//!     timeout_secs: 60
//!     on_failure: halt
//!   delivery:
//!     on_failure: continue
//! ```

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, instrument};

/// What the orchestrator does with later stages once a stage fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Skip every later stage that depends on this stage's output.
    Halt,
    /// Keep going as if the stage had succeeded.
    Continue,
}

/// Per-stage orchestration settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct StageSettings {
    pub timeout_secs: u64,
    pub on_failure: FailurePolicy,
    /// Run this stage even after an upstream halt, accepting stale input.
    pub runs_on_stale_data: bool,
}

impl Default for StageSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 300,
            on_failure: FailurePolicy::Halt,
            runs_on_stale_data: false,
        }
    }
}

impl StageSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct StagesConfig {
    pub extraction: StageSettings,
    pub transformation: StageSettings,
    pub loading: StageSettings,
    pub delivery: StageSettings,
}

impl Default for StagesConfig {
    fn default() -> Self {
        Self {
            extraction: StageSettings::default(),
            transformation: StageSettings::default(),
            loading: StageSettings::default(),
            delivery: StageSettings {
                on_failure: FailurePolicy::Continue,
                runs_on_stale_data: true,
                ..StageSettings::default()
            },
        }
    }
}

/// Everything the four stages and the orchestrator need to know.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Listing page to scrape.
    pub source_url: String,
    /// Endpoint probed before fetching to fail fast when offline.
    pub connectivity_url: String,
    pub max_attempts: usize,
    pub backoff_secs: u64,
    pub request_timeout_secs: u64,
    pub data_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub recipients: Vec<String>,
    pub subject: String,
    /// Pre-authorized credential artifact for the mail transport.
    pub token_path: PathBuf,
    /// Number of newest rows in the digest; `0` sends every row.
    pub digest_limit: usize,
    pub stages: StagesConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source_url: "https://news.ycombinator.com".to_string(),
            connectivity_url: "https://api.github.com".to_string(),
            max_attempts: 3,
            backoff_secs: 5,
            request_timeout_secs: 15,
            data_dir: PathBuf::from("data"),
            logs_dir: PathBuf::from("logs"),
            recipients: Vec::new(),
            subject: "Weekly Tech News Digest".to_string(),
            token_path: PathBuf::from("token.json"),
            digest_limit: 10,
            stages: StagesConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load a YAML config file, or the defaults when no path is given.
    #[instrument(level = "info")]
    pub fn load(path: Option<&Path>) -> Result<Self, Box<dyn Error>> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("cannot read config {}: {e}", path.display()))?;
        let config: PipelineConfig = serde_yaml::from_str(&text)?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    pub fn raw_path(&self) -> PathBuf {
        self.data_dir.join("articles_raw.csv")
    }

    pub fn clean_path(&self) -> PathBuf {
        self.data_dir.join("articles_clean.csv")
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("news_articles.db")
    }

    pub fn pipeline_log_path(&self) -> PathBuf {
        self.logs_dir.join("pipeline_log.txt")
    }

    pub fn delivery_log_path(&self) -> PathBuf {
        self.logs_dir.join("newsletter_log.txt")
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_secs(self.backoff_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Legacy mode: every stage runs no matter what happened before it.
    pub fn continue_on_failure(&mut self) {
        for stage in [
            &mut self.stages.extraction,
            &mut self.stages.transformation,
            &mut self.stages.loading,
            &mut self.stages.delivery,
        ] {
            stage.on_failure = FailurePolicy::Continue;
        }
    }
}
