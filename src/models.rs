//! Data models shared by the pipeline stages.
//!
//! This module defines the records that travel between stages through the
//! on-disk artifacts:
//! - [`ArticleRecord`]: a scraped listing item, as written to the raw store
//! - [`CleanRecord`]: the normalized form, as written to the clean store and
//!   the durable table
//! - [`DeliveryLogEntry`]: the outcome of one digest delivery attempt
//!
//! Column order of both CSV stores is fixed by [`COLUMNS`]; the serde field
//! order of the record structs matches it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed column order of the raw and clean stores.
pub const COLUMNS: [&str; 5] = ["title", "author", "pub_date", "scraped_at", "url"];

/// Author recorded when the listing does not name one.
pub const UNKNOWN_AUTHOR: &str = "Unknown";

/// Format of `scraped_at` stamps, both at fetch time and after normalization.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Canonical format of `pub_date` after normalization.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// A raw listing item as scraped by the fetcher.
///
/// `pub_date` is the publish-time string exactly as found in the markup, or
/// `None` when the listing carried none. It is only interpreted by the
/// normalizer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ArticleRecord {
    /// Headline text of the item.
    pub title: String,
    /// Submitter name, [`UNKNOWN_AUTHOR`] when absent.
    pub author: String,
    /// Free-text publish time, if the listing had one.
    pub pub_date: Option<String>,
    /// UTC time the page was fetched, in [`TIMESTAMP_FORMAT`].
    pub scraped_at: String,
    /// Link target of the item.
    pub url: String,
}

/// A normalized record, ready for the durable table.
///
/// `pub_date` is never empty and always in [`DATE_FORMAT`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CleanRecord {
    pub title: String,
    pub author: String,
    pub pub_date: String,
    pub scraped_at: String,
    pub url: String,
}

impl CleanRecord {
    /// Identity used for deduplication: same title on the same day is the
    /// same article, whoever posted it.
    pub fn dedup_key(&self) -> (String, String) {
        (self.title.clone(), self.pub_date.clone())
    }

    /// Row view in [`COLUMNS`] order, used by the table renderer.
    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.title.clone(),
            self.author.clone(),
            self.pub_date.clone(),
            self.scraped_at.clone(),
            self.url.clone(),
        ]
    }
}

impl ArticleRecord {
    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.title.clone(),
            self.author.clone(),
            self.pub_date.clone().unwrap_or_default(),
            self.scraped_at.clone(),
            self.url.clone(),
        ]
    }
}

/// Outcome of a single delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    Success,
    Failure,
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryStatus::Success => f.write_str("SUCCESS"),
            DeliveryStatus::Failure => f.write_str("FAILURE"),
        }
    }
}

/// One line of the delivery log.
///
/// Rendered as `timestamp | STATUS | recipient [| error]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryLogEntry {
    pub timestamp: String,
    pub status: DeliveryStatus,
    pub recipient: String,
    pub error_detail: Option<String>,
}

impl fmt::Display for DeliveryLogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} | {} | {}", self.timestamp, self.status, self.recipient)?;
        if let Some(detail) = &self.error_detail {
            // Keep one entry per line even when the transport error is multi-line.
            write!(f, " | {}", detail.replace(['\r', '\n'], " "))?;
        }
        Ok(())
    }
}
