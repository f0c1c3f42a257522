//! Listing scrapers.
//!
//! A scraper turns the markup of one listing page into [`ArticleRecord`]s.
//! Fetching is delegated to a [`RetryFetch`]-wrapped [`FetchPage`], so the
//! scraper never sees transport errors except as an exhausted budget.
//!
//! # Supported Sources
//!
//! | Source | Module | Method |
//! |--------|--------|--------|
//! | Hacker News | [`hackernews`] | HTML scraping of the front page table |

pub mod hackernews;

use crate::http::{FetchError, FetchPage, RetryFetch};
use crate::models::ArticleRecord;
use crate::utils::utc_timestamp;
use tracing::{info, instrument, warn};

/// Fetch the listing at `source_url` and parse it into records.
///
/// Returns [`FetchError::Exhausted`] when every attempt failed and
/// [`FetchError::NoArticles`] when the page parsed to nothing.
#[instrument(level = "info", skip(fetcher))]
pub async fn fetch_articles<F: FetchPage>(
    fetcher: &RetryFetch<F>,
    source_url: &str,
) -> Result<Vec<ArticleRecord>, FetchError> {
    let html = fetcher.fetch(source_url).await?;
    let records = hackernews::parse_listing(&html, source_url, &utc_timestamp());
    if records.is_empty() {
        warn!(source = source_url, "No articles found");
        return Err(FetchError::NoArticles);
    }
    info!(count = records.len(), "Fetched articles");
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;
    use std::time::Duration;

    struct StaticPage(&'static str);

    impl FetchPage for StaticPage {
        async fn fetch_page(&self, _url: &str) -> Result<String, Box<dyn Error>> {
            Ok(self.0.to_string())
        }
    }

    #[tokio::test]
    async fn test_empty_listing_is_no_articles() {
        let fetcher = RetryFetch::new(StaticPage("<html><body></body></html>"), 3, Duration::ZERO);
        let err = fetch_articles(&fetcher, "https://news.ycombinator.com").await.unwrap_err();
        assert!(matches!(err, FetchError::NoArticles));
    }

    #[tokio::test]
    async fn test_listing_records_carry_scrape_stamp() {
        let page = r#"<table><tr class="athing"><td><span class="titleline"><a href="https://a.example">A</a></span></td></tr><tr><td></td></tr></table>"#;
        let fetcher = RetryFetch::new(StaticPage(page), 1, Duration::ZERO);

        let records = fetch_articles(&fetcher, "https://news.ycombinator.com").await.unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "A");
        assert_eq!(records[0].scraped_at.len(), "2024-01-05 10:00:00".len());
    }
}
