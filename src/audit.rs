//! Append-only text logs kept next to the data.
//!
//! Two independent logs exist: the pipeline stage log (`timestamp | EVENT
//! stage`) and the delivery log (`timestamp | STATUS | recipient [| error]`).
//! Both are plain files created with their parent directory on first write and
//! never rewritten. They are an operator audit trail, separate from the
//! `tracing` diagnostics.

use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::models::DeliveryLogEntry;
use crate::utils::log_timestamp;

#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `timestamp | message` as one line.
    pub async fn event(&self, message: &str) -> io::Result<()> {
        self.append_line(&format!("{} | {}", log_timestamp(), message))
            .await
    }

    pub async fn delivery(&self, entry: &DeliveryLogEntry) -> io::Result<()> {
        self.append_line(&entry.to_string()).await
    }

    async fn append_line(&self, line: &str) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.flush().await?;
        debug!(path = %self.path.display(), %line, "Appended audit line");
        Ok(())
    }
}
