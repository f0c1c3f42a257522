//! Delivery stage: render the digest and send it to every recipient.
//!
//! # Architecture
//!
//! - [`CredentialProvider`]: yields a send-scoped access token; asked once per
//!   batch so an expired token is refreshed before any message goes out
//! - [`MessageTransport`]: submits one [`Envelope`]
//! - [`deliver`]: drives both, one recipient at a time
//!
//! Delivery is at-least-once and not tied to the database commit. Every
//! attempt, successful or not, is appended to the delivery log; a failure for
//! one recipient never prevents the attempt for the next.

pub mod digest;
pub mod gmail;

use chrono::{DateTime, Duration, Utc};
use futures::stream::{self, StreamExt};
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use crate::audit::AuditLog;
use crate::models::{CleanRecord, DeliveryLogEntry, DeliveryStatus};
use crate::utils::log_timestamp;
use digest::{DigestTemplate, render_digest};

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("credential error: {0}")]
    Credentials(String),
    #[error("transport rejected message: {0}")]
    Transport(String),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("malformed credential file: {0}")]
    Json(#[from] serde_json::Error),
}

/// A bearer token for the message transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub value: String,
    /// `None` when the issuer did not say; treated as valid.
    pub expires_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    /// Valid for at least another minute at `now`.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(at) => at - Duration::seconds(60) > now,
            None => true,
        }
    }
}

/// One outgoing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub to: String,
    pub subject: String,
    pub html_body: String,
}

pub trait CredentialProvider {
    async fn access_token(&self) -> Result<AccessToken, DeliveryError>;
}

pub trait MessageTransport {
    async fn send(&self, envelope: &Envelope, token: &AccessToken) -> Result<(), DeliveryError>;
}

/// Per-recipient outcomes of one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub entries: Vec<DeliveryLogEntry>,
}

impl DeliveryReport {
    pub fn succeeded(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.status == DeliveryStatus::Success)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.entries.len() - self.succeeded()
    }
}

/// Render `records` once and send the digest to each recipient in turn.
#[instrument(level = "info", skip_all, fields(records = records.len(), recipients = recipients.len()))]
pub async fn deliver<C, T>(
    records: &[CleanRecord],
    recipients: &[String],
    subject: &str,
    template: &DigestTemplate,
    credentials: &C,
    transport: &T,
    log: &AuditLog,
) -> DeliveryReport
where
    C: CredentialProvider,
    T: MessageTransport,
{
    let html_body = render_digest(records, template);

    let token = match credentials.access_token().await {
        Ok(token) => Some(token),
        Err(e) => {
            error!(error = %e, "Could not obtain credentials; every recipient fails");
            None
        }
    };
    let token_error = "credentials unavailable".to_string();

    let entries: Vec<DeliveryLogEntry> = stream::iter(recipients)
        .then(|recipient| {
            let envelope = Envelope {
                to: recipient.clone(),
                subject: subject.to_string(),
                html_body: html_body.clone(),
            };
            let token = token.as_ref();
            let token_error = &token_error;
            async move {
                let result = match token {
                    Some(token) => transport.send(&envelope, token).await.map_err(|e| e.to_string()),
                    None => Err(token_error.clone()),
                };
                let entry = match result {
                    Ok(()) => {
                        println!("✅ Sent to {}", envelope.to);
                        info!(recipient = %envelope.to, "Digest sent");
                        DeliveryLogEntry {
                            timestamp: log_timestamp(),
                            status: DeliveryStatus::Success,
                            recipient: envelope.to,
                            error_detail: None,
                        }
                    }
                    Err(detail) => {
                        println!("❌ Failed to send to {}: {}", envelope.to, detail);
                        warn!(recipient = %envelope.to, error = %detail, "Digest delivery failed");
                        DeliveryLogEntry {
                            timestamp: log_timestamp(),
                            status: DeliveryStatus::Failure,
                            recipient: envelope.to,
                            error_detail: Some(detail),
                        }
                    }
                };
                if let Err(e) = log.delivery(&entry).await {
                    error!(path = %log.path().display(), error = %e, "Failed to append delivery log");
                }
                entry
            }
        })
        .collect()
        .await;

    let report = DeliveryReport { entries };
    info!(
        succeeded = report.succeeded(),
        failed = report.failed(),
        "Delivery batch finished"
    );
    report
}
