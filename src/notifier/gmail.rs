//! Gmail API transport and Google authorized-user credentials.
//!
//! The credential artifact is the JSON file Google's OAuth tooling writes for
//! an installed app (`token`, `refresh_token`, `client_id`, `client_secret`,
//! `token_uri`, `scopes`, `expiry`). It is only ever read: a refreshed access
//! token lives in memory for the current batch.

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::json;
use std::path::PathBuf;
use tracing::{debug, info, instrument, warn};

use super::{AccessToken, CredentialProvider, DeliveryError, Envelope, MessageTransport};
use crate::utils::truncate_for_log;

pub const GMAIL_SEND_SCOPE: &str = "https://www.googleapis.com/auth/gmail.send";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const SEND_ENDPOINT: &str = "https://gmail.googleapis.com/gmail/v1/users/me/messages/send";

#[derive(Debug, Deserialize)]
struct AuthorizedUser {
    token: Option<String>,
    refresh_token: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
    token_uri: Option<String>,
    #[serde(default)]
    scopes: Vec<String>,
    expiry: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    expires_in: Option<i64>,
}

/// Reads a pre-authorized user credential file and refreshes it on demand.
#[derive(Debug, Clone)]
pub struct AuthorizedUserFile {
    path: PathBuf,
    client: reqwest::Client,
}

impl AuthorizedUserFile {
    pub fn new(path: impl Into<PathBuf>, client: reqwest::Client) -> Self {
        Self {
            path: path.into(),
            client,
        }
    }

    async fn refresh(&self, creds: &AuthorizedUser) -> Result<AccessToken, DeliveryError> {
        let (Some(refresh_token), Some(client_id), Some(client_secret)) =
            (&creds.refresh_token, &creds.client_id, &creds.client_secret)
        else {
            return Err(DeliveryError::Credentials(
                "access token expired and no refresh credentials are available".to_string(),
            ));
        };
        let token_uri = creds.token_uri.as_deref().unwrap_or(DEFAULT_TOKEN_URI);
        let resp = self
            .client
            .post(token_uri)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
                ("client_id", client_id.as_str()),
                ("client_secret", client_secret.as_str()),
            ])
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(DeliveryError::Credentials(format!(
                "token refresh failed with {status}: {}",
                truncate_for_log(&body, 300)
            )));
        }
        let refreshed: RefreshResponse = resp.json().await?;
        info!("Refreshed access token");
        Ok(AccessToken {
            value: refreshed.access_token,
            expires_at: refreshed
                .expires_in
                .and_then(Duration::try_seconds)
                .map(|ttl| Utc::now() + ttl),
        })
    }
}

impl CredentialProvider for AuthorizedUserFile {
    #[instrument(level = "info", skip(self), fields(path = %self.path.display()))]
    async fn access_token(&self) -> Result<AccessToken, DeliveryError> {
        let text = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            DeliveryError::Credentials(format!("cannot read {}: {e}", self.path.display()))
        })?;
        let creds: AuthorizedUser = serde_json::from_str(&text)?;

        if !creds.scopes.is_empty() && !creds.scopes.iter().any(|s| s == GMAIL_SEND_SCOPE) {
            return Err(DeliveryError::Credentials(format!(
                "credential is not authorized for {GMAIL_SEND_SCOPE}"
            )));
        }

        let expires_at = creds
            .expiry
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc));
        if let Some(token) = &creds.token {
            let candidate = AccessToken {
                value: token.clone(),
                expires_at,
            };
            if candidate.is_fresh(Utc::now()) {
                debug!("Stored access token is still valid");
                return Ok(candidate);
            }
            warn!(?expires_at, "Stored access token expired; refreshing");
        }
        self.refresh(&creds).await
    }
}

/// Submits messages through the Gmail `messages.send` endpoint.
#[derive(Debug, Clone)]
pub struct GmailTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl GmailTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            endpoint: SEND_ENDPOINT.to_string(),
        }
    }
}

impl MessageTransport for GmailTransport {
    #[instrument(level = "info", skip_all, fields(to = %envelope.to))]
    async fn send(&self, envelope: &Envelope, token: &AccessToken) -> Result<(), DeliveryError> {
        let raw = URL_SAFE.encode(to_rfc822(envelope));
        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&token.value)
            .json(&json!({ "raw": raw }))
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(DeliveryError::Transport(format!(
                "{status}: {}",
                truncate_for_log(&body, 300)
            )));
        }
        Ok(())
    }
}

/// Serialize an envelope as an RFC 822 message with an HTML body.
pub fn to_rfc822(envelope: &Envelope) -> String {
    format!(
        "To: {}\r\nSubject: {}\r\nMIME-Version: 1.0\r\nContent-Type: text/html; charset=\"utf-8\"\r\nContent-Transfer-Encoding: 8bit\r\n\r\n{}",
        header_value(&envelope.to),
        encode_header(&header_value(&envelope.subject)),
        envelope.html_body
    )
}

/// Header values must not smuggle in extra header lines.
fn header_value(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}

/// RFC 2047 encoded-word for non-ASCII header text.
fn encode_header(value: &str) -> String {
    if value.is_ascii() {
        value.to_string()
    } else {
        format!("=?utf-8?B?{}?=", STANDARD.encode(value))
    }
}
