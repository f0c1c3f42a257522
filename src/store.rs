//! Durable SQLite table of normalized articles.
//!
//! # Responsibility
//! - Open the database file and ensure the `news_articles` table exists.
//! - Append cleaned records; report the table's row count.
//! - Serve the newest rows to the notifier.
//!
//! # Invariants
//! - Rows are only ever inserted, never updated or deleted.
//! - No conflict detection on insert: duplicate suppression is the
//!   normalizer's job.

use rusqlite::{Connection, params};
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info, instrument};

use crate::models::CleanRecord;

pub const TABLE_NAME: &str = "news_articles";

const CREATE_TABLE: &str = "
CREATE TABLE IF NOT EXISTS news_articles (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT,
    author TEXT,
    pub_date TEXT,
    scraped_at TEXT,
    url TEXT
)";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cleaned data not found at {0}, run transformation first")]
    MissingCleanStore(PathBuf),
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("failed to read cleaned data: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to prepare database directory: {0}")]
    Io(#[from] std::io::Error),
}

/// Open (creating if needed) the database file and ensure the schema.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub fn open_store(path: &Path) -> Result<Connection, StoreError> {
    let started_at = Instant::now();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let conn = Connection::open(path).inspect_err(|e| {
        error!(error = %e, duration_ms = started_at.elapsed().as_millis(), "Unable to open database file")
    })?;
    ensure_schema(&conn)?;
    info!(duration_ms = started_at.elapsed().as_millis(), "Opened database");
    Ok(conn)
}

/// In-memory store with the schema applied.
#[cfg(test)]
pub fn open_store_in_memory() -> Result<Connection, StoreError> {
    let conn = Connection::open_in_memory()?;
    ensure_schema(&conn)?;
    Ok(conn)
}

fn ensure_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(CREATE_TABLE)?;
    Ok(())
}

/// Append every record in one transaction and return the table's total
/// row count afterwards.
#[instrument(level = "info", skip_all, fields(count = records.len()))]
pub fn load(conn: &mut Connection, records: &[CleanRecord]) -> Result<i64, StoreError> {
    let tx = conn.transaction()?;
    {
        let mut insert = tx.prepare(
            "INSERT INTO news_articles (title, author, pub_date, scraped_at, url)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for record in records {
            insert.execute(params![
                record.title,
                record.author,
                record.pub_date,
                record.scraped_at,
                record.url
            ])?;
        }
    }
    tx.commit()?;

    let total = row_count(conn)?;
    info!(inserted = records.len(), total, table = TABLE_NAME, "Loaded records");
    Ok(total)
}

pub fn row_count(conn: &Connection) -> Result<i64, StoreError> {
    let total = conn.query_row("SELECT COUNT(*) FROM news_articles", [], |row| row.get(0))?;
    Ok(total)
}

/// The `limit` most recently inserted rows, newest first. `0` returns all.
#[instrument(level = "info", skip(conn))]
pub fn newest(conn: &Connection, limit: usize) -> Result<Vec<CleanRecord>, StoreError> {
    // SQLite treats a negative LIMIT as unbounded.
    let limit = if limit == 0 { -1 } else { limit as i64 };
    let mut stmt = conn.prepare(
        "SELECT title, author, pub_date, scraped_at, url
         FROM news_articles ORDER BY id DESC LIMIT ?1",
    )?;
    let rows = stmt.query_map([limit], |row| {
        Ok(CleanRecord {
            title: row.get::<_, Option<String>>(0)?.unwrap_or_default(),
            author: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
            pub_date: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
            scraped_at: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
            url: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
        })
    })?;
    let records = rows.collect::<Result<Vec<_>, _>>()?;
    info!(count = records.len(), "Read newest records");
    Ok(records)
}
