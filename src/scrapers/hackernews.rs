//! Hacker News front page scraper.
//!
//! The listing is a table where every story is a `tr.athing` row holding the
//! headline anchor (`.titleline > a`), followed by a sibling `tr` with the
//! submitter (`.hnuser`) and an `.age` span whose `title` attribute carries
//! the publish time, e.g. `2024-01-05T10:00:00 1704448800`.

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use std::fmt;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::models::{ArticleRecord, UNKNOWN_AUTHOR};

static ITEM: Lazy<Selector> = Lazy::new(|| Selector::parse(".athing").unwrap());
static TITLE_LINK: Lazy<Selector> = Lazy::new(|| Selector::parse(".titleline > a").unwrap());
static AGE: Lazy<Selector> = Lazy::new(|| Selector::parse(".age").unwrap());
static AUTHOR: Lazy<Selector> = Lazy::new(|| Selector::parse(".hnuser").unwrap());

/// Why a single listing row was skipped.
#[derive(Debug, PartialEq, Eq)]
pub enum ItemError {
    MissingTitleLink,
    MissingHref,
    EmptyTitle,
}

impl fmt::Display for ItemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemError::MissingTitleLink => f.write_str("row has no title link"),
            ItemError::MissingHref => f.write_str("title link has no href"),
            ItemError::EmptyTitle => f.write_str("title link has no text"),
        }
    }
}

impl std::error::Error for ItemError {}

/// Parse every story row of a listing page.
///
/// Rows that cannot be parsed are logged and skipped; the rest of the batch
/// is unaffected. `scraped_at` is stamped on every record.
#[instrument(level = "info", skip(html), fields(bytes = html.len()))]
pub fn parse_listing(html: &str, base_url: &str, scraped_at: &str) -> Vec<ArticleRecord> {
    let document = Html::parse_document(html);
    let base = Url::parse(base_url).ok();

    let mut records = Vec::new();
    for (index, item) in document.select(&ITEM).enumerate() {
        match parse_item(item, base.as_ref(), scraped_at) {
            Ok(record) => records.push(record),
            Err(e) => warn!(index, error = %e, "Error parsing article; skipping"),
        }
    }

    info!(count = records.len(), source = base_url, "Parsed listing");
    records
}

fn parse_item(
    item: ElementRef<'_>,
    base: Option<&Url>,
    scraped_at: &str,
) -> Result<ArticleRecord, ItemError> {
    let link = item
        .select(&TITLE_LINK)
        .next()
        .ok_or(ItemError::MissingTitleLink)?;
    let href = link.value().attr("href").ok_or(ItemError::MissingHref)?;
    let title = link.text().collect::<String>().trim().to_string();
    if title.is_empty() {
        return Err(ItemError::EmptyTitle);
    }

    // Relative links ("item?id=...") point back into the site.
    let url = base
        .and_then(|b| b.join(href).ok())
        .map(|u| u.to_string())
        .unwrap_or_else(|| href.to_string());

    let subtext = item
        .next_siblings()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "tr");

    let author = subtext
        .and_then(|row| row.select(&AUTHOR).next())
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string());

    let pub_date = subtext
        .and_then(|row| row.select(&AGE).next())
        .and_then(|el| el.value().attr("title"))
        .map(str::to_string);

    debug!(%title, %author, ?pub_date, "Parsed article");
    Ok(ArticleRecord {
        title,
        author,
        pub_date,
        scraped_at: scraped_at.to_string(),
        url,
    })
}
