// SPDX-License-Identifier: PMPL-1.0-or-later
//! Outbound mail for download notifications.
//!
//! The service only needs one call, `send`, so the provider sits behind the
//! [`Mailer`] trait. [`HttpMailer`] talks to a JSON transactional-mail API.

use crate::config::MailConfig;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// A plain-text message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub to: String,
    pub from: String,
    pub subject: String,
    pub text: String,
}

#[derive(Debug, Error)]
pub enum MailError {
    #[error("mail transport failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("mail provider returned {status}")]
    Rejected { status: u16 },
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: MailMessage) -> Result<(), MailError>;
}

/// Request body accepted by the provider.
#[derive(Debug, Serialize)]
struct ProviderPayload<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    text: &'a str,
}

/// Mail provider client
pub struct HttpMailer {
    endpoint: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpMailer {
    pub fn new(endpoint: String, api_key: Option<String>, config: &MailConfig) -> Result<Self, MailError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;
        Ok(Self {
            endpoint,
            api_key,
            client,
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, message: MailMessage) -> Result<(), MailError> {
        let payload = ProviderPayload {
            from: &message.from,
            to: [&message.to],
            subject: &message.subject,
            text: &message.text,
        };

        let mut request = self.client.post(&self.endpoint).json(&payload);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(MailError::Rejected {
                status: response.status().as_u16(),
            });
        }

        debug!(to = %message.to, "notification mail accepted");
        Ok(())
    }
}

/// Build the configured mailer, or `None` when notifications are off.
pub fn build_mailer(config: &MailConfig) -> Option<Arc<dyn Mailer>> {
    let Some(endpoint) = config.endpoint.clone().filter(|e| !e.trim().is_empty()) else {
        debug!("mail endpoint not configured; notifications disabled");
        return None;
    };

    match HttpMailer::new(endpoint, config.api_key.clone(), config) {
        Ok(mailer) => Some(Arc::new(mailer)),
        Err(err) => {
            warn!(error = %err, "failed to build mail client; notifications disabled");
            None
        }
    }
}

/// Notification sent when a gated file is downloaded.
pub fn download_notice(
    from: &str,
    to: &str,
    email: &str,
    path: &str,
    title: Option<&str>,
) -> MailMessage {
    let what = title.unwrap_or(path);
    MailMessage {
        to: to.to_string(),
        from: from.to_string(),
        subject: format!("Download: {what}"),
        text: format!("{email} downloaded {path}\nTitle: {}\n", title.unwrap_or("-")),
    }
}
