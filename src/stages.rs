//! Stage entry points, one per subcommand.
//!
//! Each function is the whole body of one child process: it reads its input
//! artifact, does its work, writes its output artifact, and prints progress
//! for the operator. An `Err` becomes a non-zero exit status in `main`, which
//! is all the orchestrator ever sees.
//!
//! | Stage          | Input                   | Output                  |
//! |----------------|-------------------------|-------------------------|
//! | [`extract`]    | listing page            | `articles_raw.csv`      |
//! | [`transform`]  | `articles_raw.csv`      | `articles_clean.csv`    |
//! | [`load`]       | `articles_clean.csv`    | `news_articles.db`      |
//! | [`deliver`]    | `news_articles.db`      | email + delivery log    |

use std::error::Error;
use std::path::Path;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::audit::AuditLog;
use crate::config::PipelineConfig;
use crate::http::{FetchError, FetchPage, HttpFetcher, RetryFetch, check_connectivity};
use crate::models::{ArticleRecord, CleanRecord};
use crate::normalize::{self, NormalizeError, NormalizeStats};
use crate::notifier::digest::DigestTemplate;
use crate::notifier::gmail::{AuthorizedUserFile, GmailTransport};
use crate::notifier::{self, CredentialProvider, DeliveryReport, MessageTransport};
use crate::outputs::artifacts::{read_records, write_records};
use crate::outputs::table::{RenderConfig, render};
use crate::pipeline::{Orchestrator, PipelineRun, ProcessInvoker};
use crate::scrapers;
use crate::store::{self, StoreError};

const SAMPLE_ROWS: usize = 5;
const RULE_WIDTH: usize = 100;

/// What `extract` does besides fetching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractMode {
    /// Fetch, persist, then display the batch.
    FetchAndView,
    /// Fetch and persist without display.
    FetchOnly,
    /// Display an existing artifact; no network access.
    ViewOnly { clean: bool },
}

/// Extraction stage against the configured source.
#[instrument(level = "info", skip(config), fields(source = %config.source_url))]
pub async fn extract(config: &PipelineConfig, mode: ExtractMode) -> Result<(), Box<dyn Error>> {
    if let ExtractMode::ViewOnly { clean } = mode {
        view(config, clean)?;
        return Ok(());
    }

    let fetcher = HttpFetcher::new(config.request_timeout())?;
    let client = fetcher.client().clone();
    let fetcher = RetryFetch::new(fetcher, config.max_attempts, config.backoff());
    extract_after_preflight(&client, &fetcher, config, mode).await?;
    Ok(())
}

/// Probe `config.connectivity_url` with `client`, then fetch with `fetcher`.
///
/// A failed probe returns [`FetchError::Connectivity`] before the first
/// fetch attempt.
pub async fn extract_after_preflight<F: FetchPage>(
    client: &reqwest::Client,
    fetcher: &RetryFetch<F>,
    config: &PipelineConfig,
    mode: ExtractMode,
) -> Result<usize, FetchError> {
    if let Err(e) = check_connectivity(client, &config.connectivity_url).await {
        println!("Network Error: Please check your connection and proxy settings");
        return Err(e);
    }
    extract_with(fetcher, config, mode).await
}

/// Fetch with `fetcher` and write the raw store.
///
/// Returns the number of records written; an empty listing is not an error
/// and writes nothing.
pub async fn extract_with<F: FetchPage>(
    fetcher: &RetryFetch<F>,
    config: &PipelineConfig,
    mode: ExtractMode,
) -> Result<usize, FetchError> {
    let records = match scrapers::fetch_articles(fetcher, &config.source_url).await {
        Ok(records) => records,
        Err(FetchError::NoArticles) => {
            println!("No articles found.");
            return Ok(0);
        }
        Err(e) => {
            println!("Error: All retry attempts failed");
            error!(error = %e, "Extraction failed");
            return Err(e);
        }
    };

    let raw_path = config.raw_path();
    write_records(&raw_path, &records, true)?;
    println!("\nExtracted {} articles to {}", records.len(), raw_path.display());
    info!(count = records.len(), path = %raw_path.display(), "Wrote raw store");

    if mode == ExtractMode::FetchAndView {
        print_articles(&records.iter().map(ArticleRecord::to_row).collect::<Vec<_>>());
    }
    Ok(records.len())
}

/// Render the raw (or clean) artifact as a table. Returns the row count.
pub fn view(config: &PipelineConfig, clean: bool) -> Result<usize, Box<dyn Error>> {
    let rows: Vec<Vec<String>> = if clean {
        let path = config.clean_path();
        if !path.exists() {
            println!("No articles found. Please run transformation first.");
            return Ok(0);
        }
        read_records::<CleanRecord>(&path)?
            .iter()
            .map(CleanRecord::to_row)
            .collect()
    } else {
        match normalize::read_raw_store(&config.raw_path()) {
            Ok(records) => records.iter().map(ArticleRecord::to_row).collect(),
            Err(NormalizeError::MissingRawStore(_)) => {
                println!("No articles found. Please extract articles first.");
                return Ok(0);
            }
            Err(e) => return Err(e.into()),
        }
    };
    print_articles(&rows);
    Ok(rows.len())
}

fn print_articles(rows: &[Vec<String>]) {
    let rule = "=".repeat(RULE_WIDTH);
    println!("\nArticles Database:");
    println!("{rule}");
    println!("{}", render(rows, &RenderConfig::articles()));
    println!("{rule}");
    println!("\nTotal articles: {}", rows.len());
}

/// Transformation stage: raw store to clean store.
#[instrument(level = "info", skip_all)]
pub fn transform(config: &PipelineConfig) -> Result<NormalizeStats, Box<dyn Error>> {
    let raw = match normalize::read_raw_store(&config.raw_path()) {
        Ok(raw) => raw,
        Err(e @ NormalizeError::MissingRawStore(_)) => {
            println!("❌ Error: Raw data file not found. Run extraction first.");
            return Err(e.into());
        }
        Err(e) => return Err(e.into()),
    };
    println!("\n🧹 Starting transformation: {} raw rows", raw.len());

    let outcome = normalize::normalize(raw);
    let clean_path = config.clean_path();
    write_records(&clean_path, &outcome.records, false)?;

    let stats = outcome.stats;
    println!("✅ Cleaned data saved to {}", clean_path.display());
    println!(
        "Raw: {}, Duplicates removed: {}, Final: {}",
        stats.raw, stats.removed, stats.final_count
    );
    if stats.dropped > 0 {
        println!("Undatable rows dropped: {}", stats.dropped);
    }

    let sample: Vec<Vec<String>> = outcome.records.iter().map(CleanRecord::to_row).collect();
    println!("\nSample cleaned data:");
    println!("{}", render(&sample, &RenderConfig::sample(SAMPLE_ROWS)));
    Ok(stats)
}

/// Loading stage: append the clean store to the durable table.
///
/// Returns the table's row count after the load.
#[instrument(level = "info", skip_all)]
pub fn load(config: &PipelineConfig) -> Result<i64, StoreError> {
    let clean_path = config.clean_path();
    if !clean_path.exists() {
        println!("❌ Error: Cleaned data not found. Run transformation first.");
        return Err(StoreError::MissingCleanStore(clean_path));
    }
    let records: Vec<CleanRecord> = read_records(&clean_path)?;
    println!("📦 Loading {} cleaned articles into database...", records.len());

    let db_path = config.db_path();
    let mut conn = store::open_store(&db_path)?;
    let total = store::load(&mut conn, &records)?;

    println!("✅ Data successfully loaded into {}", db_path.display());
    println!("Total records in table '{}': {}", store::TABLE_NAME, total);
    Ok(total)
}

/// Delivery stage through Gmail with the configured credential file.
#[instrument(level = "info", skip_all, fields(recipients = config.recipients.len()))]
pub async fn deliver(config: &PipelineConfig) -> Result<(), Box<dyn Error>> {
    let client = reqwest::Client::builder()
        .timeout(config.request_timeout())
        .build()?;
    let credentials = AuthorizedUserFile::new(&config.token_path, client.clone());
    let transport = GmailTransport::new(client);
    let report = deliver_with(config, &credentials, &transport).await?;
    if report.failed() > 0 {
        return Err(format!(
            "{} of {} deliveries failed",
            report.failed(),
            report.entries.len()
        )
        .into());
    }
    Ok(())
}

/// Send the newest `digest_limit` rows to every configured recipient.
pub async fn deliver_with<C, T>(
    config: &PipelineConfig,
    credentials: &C,
    transport: &T,
) -> Result<DeliveryReport, StoreError>
where
    C: CredentialProvider,
    T: MessageTransport,
{
    if config.recipients.is_empty() {
        warn!("No recipients configured; nothing to deliver");
        println!("No recipients configured.");
        return Ok(DeliveryReport::default());
    }
    let records = newest_records(&config.db_path(), config.digest_limit)?;
    if records.is_empty() {
        warn!("Durable table is empty; nothing to deliver");
        println!("No articles in the database yet.");
        return Ok(DeliveryReport::default());
    }

    let template = DigestTemplate {
        heading: format!("🗞 {}", config.subject),
        ..DigestTemplate::default()
    };
    let log = AuditLog::new(config.delivery_log_path());
    Ok(notifier::deliver(
        &records,
        &config.recipients,
        &config.subject,
        &template,
        credentials,
        transport,
        &log,
    )
    .await)
}

fn newest_records(db_path: &Path, limit: usize) -> Result<Vec<CleanRecord>, StoreError> {
    if !db_path.exists() {
        return Ok(Vec::new());
    }
    let conn = store::open_store(db_path)?;
    store::newest(&conn, limit)
}

/// Orchestrate the four stages as child processes of this executable.
///
/// `child_args` are passed to every child ahead of its subcommand. Ctrl-C
/// cancels the running stage and skips the rest.
#[instrument(level = "info", skip_all)]
pub async fn run(config: &PipelineConfig, child_args: Vec<String>) -> Result<PipelineRun, Box<dyn Error>> {
    let started = Instant::now();
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; cancelling pipeline run");
            on_interrupt.cancel();
        }
    });

    let invoker = ProcessInvoker::current_exe(child_args)?;
    let orchestrator = Orchestrator::new(
        invoker,
        config.stages.clone(),
        AuditLog::new(config.pipeline_log_path()),
        cancel,
    );
    let run = orchestrator.run().await;
    info!(elapsed_s = started.elapsed().as_secs_f64(), "Pipeline finished");
    Ok(run)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::{AccessToken, DeliveryError, Envelope};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    const LISTING: &str = r#"
<html><body><table>
  <tr class="athing" id="1">
    <td class="title"><span class="titleline"><a href="https://example.com/rust">Rust 2.0 released</a></span></td>
  </tr>
  <tr>
    <td class="subtext"><span class="subline">
      <a href="user?id=alice" class="hnuser">alice</a>
      <span class="age" title="2024-01-05T10:00:00 1704448800"><a href="item?id=1">3 hours ago</a></span>
    </span></td>
  </tr>
  <tr class="athing" id="2">
    <td class="title"><span class="titleline"><a href="item?id=2">Ask HN: Favourite editor?</a></span></td>
  </tr>
  <tr><td class="subtext"></td></tr>
</table></body></html>
"#;

    struct StaticPage(&'static str);

    impl FetchPage for StaticPage {
        async fn fetch_page(&self, _url: &str) -> Result<String, Box<dyn Error>> {
            Ok(self.0.to_string())
        }
    }

    struct Token;

    impl CredentialProvider for Token {
        async fn access_token(&self) -> Result<AccessToken, DeliveryError> {
            Ok(AccessToken {
                value: "t".to_string(),
                expires_at: None,
            })
        }
    }

    #[derive(Default)]
    struct Outbox(Mutex<Vec<Envelope>>);

    impl MessageTransport for Outbox {
        async fn send(&self, envelope: &Envelope, _token: &AccessToken) -> Result<(), DeliveryError> {
            self.0.lock().unwrap().push(envelope.clone());
            Ok(())
        }
    }

    fn config_in(dir: &Path) -> PipelineConfig {
        PipelineConfig {
            data_dir: dir.join("data"),
            logs_dir: dir.join("logs"),
            ..PipelineConfig::default()
        }
    }

    fn static_fetcher(page: &'static str) -> RetryFetch<StaticPage> {
        RetryFetch::new(StaticPage(page), 3, Duration::ZERO)
    }

    #[tokio::test]
    async fn test_extract_writes_fully_quoted_raw_store() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config_in(tmp.path());

        let count = extract_with(&static_fetcher(LISTING), &config, ExtractMode::FetchOnly)
            .await
            .unwrap();

        assert_eq!(count, 2);
        let text = std::fs::read_to_string(config.raw_path()).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            r#""title","author","pub_date","scraped_at","url""#
        );
        assert!(lines.next().unwrap().starts_with(r#""Rust 2.0 released","alice","#));
    }

    /// Counts calls without ever succeeding.
    struct CountingPage(Arc<AtomicUsize>);

    impl FetchPage for CountingPage {
        async fn fetch_page(&self, _url: &str) -> Result<String, Box<dyn Error>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err("unreachable".into())
        }
    }

    #[tokio::test]
    async fn test_failed_connectivity_check_skips_fetch_attempts() {
        let tmp = tempfile::tempdir().unwrap();
        let config = PipelineConfig {
            connectivity_url: "http://127.0.0.1:1".to_string(),
            ..config_in(tmp.path())
        };
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = RetryFetch::new(CountingPage(calls.clone()), 3, Duration::ZERO);

        let err = extract_after_preflight(&reqwest::Client::new(), &fetcher, &config, ExtractMode::FetchOnly)
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Connectivity { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(!config.raw_path().exists());
    }

    #[tokio::test]
    async fn test_empty_listing_is_not_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config_in(tmp.path());

        let count = extract_with(&static_fetcher("<html></html>"), &config, ExtractMode::FetchOnly)
            .await
            .unwrap();

        assert_eq!(count, 0);
        assert!(!config.raw_path().exists());
    }

    #[tokio::test]
    async fn test_stages_hand_off_through_artifacts() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = config_in(tmp.path());
        config.recipients = vec!["a@example.com".to_string(), "b@example.com".to_string()];
        config.digest_limit = 1;

        extract_with(&static_fetcher(LISTING), &config, ExtractMode::FetchAndView)
            .await
            .unwrap();
        let stats = transform(&config).unwrap();
        assert_eq!(stats.final_count, 2);
        assert_eq!(load(&config).unwrap(), 2);

        let outbox = Outbox::default();
        let report = deliver_with(&config, &Token, &outbox).await.unwrap();

        assert_eq!(report.succeeded(), 2);
        let sent = outbox.0.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].html_body.matches("<li>").count(), 1);
        assert!(sent[0].html_body.contains("Ask HN: Favourite editor?"));
        let log = std::fs::read_to_string(config.delivery_log_path()).unwrap();
        assert_eq!(log.lines().count(), 2);
    }

    #[test]
    fn test_transform_without_raw_store_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let err = transform(&config_in(tmp.path())).unwrap_err();
        assert!(err.to_string().contains("run extraction first"));
    }

    #[test]
    fn test_load_without_clean_store_fails() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(matches!(
            load(&config_in(tmp.path())),
            Err(StoreError::MissingCleanStore(_))
        ));
    }

    #[test]
    fn test_load_twice_appends() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config_in(tmp.path());
        let record = CleanRecord {
            title: "A".to_string(),
            author: "alice".to_string(),
            pub_date: "2024-01-05".to_string(),
            scraped_at: "2024-01-05 10:00:00".to_string(),
            url: "https://a".to_string(),
        };
        write_records(&config.clean_path(), &[record], false).unwrap();

        assert_eq!(load(&config).unwrap(), 1);
        assert_eq!(load(&config).unwrap(), 2);
    }

    #[tokio::test]
    async fn test_deliver_without_recipients_sends_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let outbox = Outbox::default();

        let report = deliver_with(&config_in(tmp.path()), &Token, &outbox).await.unwrap();

        assert!(report.entries.is_empty());
        assert!(outbox.0.lock().unwrap().is_empty());
    }

    #[test]
    fn test_view_missing_artifact_reports_zero_rows() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config_in(tmp.path());
        assert_eq!(view(&config, false).unwrap(), 0);
        assert_eq!(view(&config, true).unwrap(), 0);
    }
}
