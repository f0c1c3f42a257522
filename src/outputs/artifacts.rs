//! CSV artifacts passed between stages.
//!
//! The raw store is written fully quoted, the clean store with minimal
//! quoting; both are UTF-8 with a header row in
//! [`COLUMNS`](crate::models::COLUMNS) order.

use csv::{QuoteStyle, ReaderBuilder, WriterBuilder};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;
use tracing::{info, instrument};

/// Write `records` to `path`, creating the parent directory.
#[instrument(level = "info", skip_all, fields(path = %path.display(), count = records.len()))]
pub fn write_records<T: Serialize>(
    path: &Path,
    records: &[T],
    quote_all: bool,
) -> Result<(), csv::Error> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let quote_style = if quote_all {
        QuoteStyle::Always
    } else {
        QuoteStyle::Necessary
    };
    let mut writer = WriterBuilder::new().quote_style(quote_style).from_path(path)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    info!("Wrote artifact");
    Ok(())
}

/// Read every row of `path` into `T`, matching columns by header name.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub fn read_records<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, csv::Error> {
    let mut reader = ReaderBuilder::new().has_headers(true).from_path(path)?;
    let records = reader.deserialize().collect::<Result<Vec<T>, _>>()?;
    info!(count = records.len(), "Read artifact");
    Ok(records)
}
