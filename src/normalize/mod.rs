//! Transformation stage: canonical headers, canonical dates, deduplication.
//!
//! [`normalize`] is a pure function over the raw records. Reading the raw
//! store (with header canonicalization) and writing the clean store are
//! separate steps driven by [`crate::stages::transform`].
//!
//! # Invariants
//!
//! - Every output record has a non-empty `pub_date` in `YYYY-MM-DD` form,
//!   falling back to the date of its own `scraped_at`.
//! - No two output records share a `(title, pub_date)` pair; the first
//!   occurrence in input order wins.

pub mod dates;

use csv::{ReaderBuilder, StringRecord};
use itertools::Itertools;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::models::{ArticleRecord, CleanRecord, DATE_FORMAT, TIMESTAMP_FORMAT};
use dates::{parse_date_safe, parse_datetime_strict};

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("raw data file not found at {0}, run extraction first")]
    MissingRawStore(PathBuf),
    #[error("raw data file has no `{0}` column")]
    MissingColumn(&'static str),
    #[error("failed to read raw data: {0}")]
    Csv(#[from] csv::Error),
}

/// Row counts reported after a normalization pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizeStats {
    pub raw: usize,
    /// Rows without any usable date, not even from `scraped_at`.
    pub dropped: usize,
    /// Duplicates removed on the `(title, pub_date)` key.
    pub removed: usize,
    pub final_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizeOutcome {
    pub records: Vec<CleanRecord>,
    pub stats: NormalizeStats,
}

/// Trim, lowercase, and replace internal spaces with underscores.
pub fn canonicalize_header(name: &str) -> String {
    name.trim().to_lowercase().replace(' ', "_")
}

/// Read the raw store, matching columns by canonicalized header name.
///
/// Only `title` is required; other missing columns read as empty.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub fn read_raw_store(path: &Path) -> Result<Vec<ArticleRecord>, NormalizeError> {
    if !path.exists() {
        return Err(NormalizeError::MissingRawStore(path.to_path_buf()));
    }
    let mut reader = ReaderBuilder::new().has_headers(true).from_path(path)?;
    let headers: Vec<String> = reader.headers()?.iter().map(canonicalize_header).collect();
    let column = |name: &str| headers.iter().position(|h| h == name);

    let title = column("title").ok_or(NormalizeError::MissingColumn("title"))?;
    let author = column("author");
    let pub_date = column("pub_date");
    let scraped_at = column("scraped_at");
    let url = column("url");

    let field = |row: &StringRecord, idx: Option<usize>| -> String {
        idx.and_then(|i| row.get(i)).unwrap_or("").to_string()
    };

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        let raw_date = field(&row, pub_date);
        records.push(ArticleRecord {
            title: field(&row, Some(title)),
            author: field(&row, author),
            pub_date: (!raw_date.trim().is_empty()).then_some(raw_date),
            scraped_at: field(&row, scraped_at),
            url: field(&row, url),
        });
    }
    info!(count = records.len(), "Read raw store");
    Ok(records)
}

/// Normalize dates and drop duplicates.
#[instrument(level = "info", skip_all, fields(raw = raw.len()))]
pub fn normalize(raw: Vec<ArticleRecord>) -> NormalizeOutcome {
    let raw_count = raw.len();

    let dated: Vec<CleanRecord> = raw
        .into_iter()
        .filter_map(|record| {
            let scraped = parse_datetime_strict(&record.scraped_at);
            let pub_date = parse_date_safe(record.pub_date.as_deref(), scraped)
                .or_else(|| scraped.map(|dt| dt.date()));
            // An unreadable scrape stamp becomes midnight of the publish date.
            let scraped = scraped.or_else(|| pub_date.and_then(|d| d.and_hms_opt(0, 0, 0)));
            match pub_date.zip(scraped) {
                Some((pub_date, scraped)) => Some(CleanRecord {
                    title: record.title,
                    author: record.author,
                    pub_date: pub_date.format(DATE_FORMAT).to_string(),
                    scraped_at: scraped.format(TIMESTAMP_FORMAT).to_string(),
                    url: record.url,
                }),
                None => {
                    warn!(
                        title = %record.title,
                        pub_date = ?record.pub_date,
                        scraped_at = %record.scraped_at,
                        "No usable publication or scrape date; dropping record"
                    );
                    None
                }
            }
        })
        .collect();
    let dropped = raw_count - dated.len();

    let records: Vec<CleanRecord> = dated.into_iter().unique_by(CleanRecord::dedup_key).collect();
    let stats = NormalizeStats {
        raw: raw_count,
        dropped,
        removed: raw_count - dropped - records.len(),
        final_count: records.len(),
    };
    info!(
        raw = stats.raw,
        removed = stats.removed,
        dropped = stats.dropped,
        final_count = stats.final_count,
        "Normalized batch"
    );
    NormalizeOutcome { records, stats }
}
