//! HTTP retrieval with a connectivity preflight and fixed-backoff retry.
//!
//! # Architecture
//!
//! - [`FetchPage`]: core trait, fetch one URL as text
//! - [`HttpFetcher`]: `reqwest` implementation with browser-like headers and a
//!   per-request timeout
//! - [`RetryFetch`]: decorator that retries any [`FetchPage`] a fixed number of
//!   times with a fixed pause in between
//! - [`check_connectivity`]: fast-fail probe run before the retry loop
//!
//! # Retry Strategy
//!
//! - `max_attempts` total attempts (3 by default)
//! - Fixed backoff between attempts (5 seconds by default), none after the last
//! - Any transport error or non-2xx status consumes one attempt

use std::error::Error;
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36";
const ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9";
const CONNECTIVITY_TIMEOUT: Duration = Duration::from_secs(5);

/// Why the extraction stage produced no batch.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error: connectivity check against {url} failed, check your connection and proxy settings")]
    Connectivity { url: String },
    #[error("all {attempts} fetch attempts failed: {last_error}")]
    Exhausted { attempts: usize, last_error: String },
    #[error("no articles found")]
    NoArticles,
    #[error("failed to write raw store: {0}")]
    Store(#[from] csv::Error),
}

/// Fetch the body of a page as text.
pub trait FetchPage {
    async fn fetch_page(&self, url: &str) -> Result<String, Box<dyn Error>>;
}

/// Plain `reqwest` fetcher.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }
}

impl FetchPage for HttpFetcher {
    #[instrument(level = "debug", skip(self))]
    async fn fetch_page(&self, url: &str) -> Result<String, Box<dyn Error>> {
        let body = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, ACCEPT)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(body)
    }
}

/// Wrapper that retries any [`FetchPage`] with a fixed backoff.
pub struct RetryFetch<T> {
    inner: T,
    max_attempts: usize,
    backoff: Duration,
}

impl<T: FetchPage> RetryFetch<T> {
    pub fn new(inner: T, max_attempts: usize, backoff: Duration) -> Self {
        Self {
            inner,
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Fetch `url`, retrying transport failures until the attempt budget is spent.
    #[instrument(level = "info", skip(self), fields(max_attempts = self.max_attempts))]
    pub async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let total_t0 = Instant::now();
        let mut last_error = String::new();

        for attempt in 1..=self.max_attempts {
            info!(attempt, max = self.max_attempts, "Fetching articles");
            let attempt_t0 = Instant::now();
            match self.inner.fetch_page(url).await {
                Ok(body) => {
                    info!(attempt, bytes = body.len(), "Fetched listing page");
                    return Ok(body);
                }
                Err(e) => {
                    warn!(
                        attempt,
                        max = self.max_attempts,
                        elapsed_ms_attempt = attempt_t0.elapsed().as_millis(),
                        error = %e,
                        "Fetch attempt failed"
                    );
                    last_error = e.to_string();
                }
            }
            if attempt < self.max_attempts {
                info!(delay = ?self.backoff, "Retrying after backoff");
                sleep(self.backoff).await;
            }
        }

        error!(
            attempts = self.max_attempts,
            elapsed_ms_total = total_t0.elapsed().as_millis(),
            "All retry attempts failed"
        );
        Err(FetchError::Exhausted {
            attempts: self.max_attempts,
            last_error,
        })
    }
}

impl<T> fmt::Debug for RetryFetch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryFetch")
            .field("max_attempts", &self.max_attempts)
            .field("backoff", &self.backoff)
            .finish()
    }
}

/// Probe a known-reachable endpoint; only HTTP 200 counts as online.
#[instrument(level = "info", skip(client))]
pub async fn check_connectivity(client: &reqwest::Client, url: &str) -> Result<(), FetchError> {
    let result = client
        .get(url)
        .timeout(CONNECTIVITY_TIMEOUT)
        .send()
        .await;
    match result {
        Ok(resp) if resp.status() == reqwest::StatusCode::OK => Ok(()),
        Ok(resp) => {
            error!(status = %resp.status(), "Connectivity check returned non-200");
            Err(FetchError::Connectivity { url: url.to_string() })
        }
        Err(e) => {
            error!(error = %e, "Connectivity check failed");
            Err(FetchError::Connectivity { url: url.to_string() })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Fails the first `failures` calls, then serves a fixed body.
    #[derive(Default)]
    struct ScriptedFetcher {
        failures: usize,
        calls: Mutex<Vec<Instant>>,
    }

    impl FetchPage for ScriptedFetcher {
        async fn fetch_page(&self, _url: &str) -> Result<String, Box<dyn Error>> {
            let mut calls = self.calls.lock().unwrap();
            calls.push(Instant::now());
            if calls.len() <= self.failures {
                Err("connection reset".into())
            } else {
                Ok("<html></html>".to_string())
            }
        }
    }

    #[tokio::test]
    async fn test_retry_exhaustion_makes_exactly_max_attempts() {
        let backoff = Duration::from_millis(20);
        let retry = RetryFetch::new(
            ScriptedFetcher { failures: usize::MAX, ..Default::default() },
            3,
            backoff,
        );

        let err = retry.fetch("https://example.com").await.unwrap_err();

        match err {
            FetchError::Exhausted { attempts, last_error } => {
                assert_eq!(attempts, 3);
                assert_eq!(last_error, "connection reset");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        let calls = retry.inner.calls.lock().unwrap();
        assert_eq!(calls.len(), 3);
        for pair in calls.windows(2) {
            assert!(pair[1].duration_since(pair[0]) >= backoff);
        }
    }

    #[tokio::test]
    async fn test_retry_recovers_after_transient_failure() {
        let retry = RetryFetch::new(
            ScriptedFetcher { failures: 1, ..Default::default() },
            3,
            Duration::from_millis(1),
        );

        let body = retry.fetch("https://example.com").await.unwrap();

        assert_eq!(body, "<html></html>");
        assert_eq!(retry.inner.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_zero_attempts_still_tries_once() {
        let retry = RetryFetch::new(ScriptedFetcher::default(), 0, Duration::ZERO);
        assert!(retry.fetch("https://example.com").await.is_ok());
    }

    #[test]
    fn test_error_messages_distinguish_causes() {
        let offline = FetchError::Connectivity { url: "https://api.github.com".to_string() };
        assert!(offline.to_string().starts_with("network error"));
        assert_eq!(FetchError::NoArticles.to_string(), "no articles found");
    }
}
