// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! HTTP handlers and the state they share.

pub mod auth;
pub mod email;
pub mod health;
pub mod notify;

use crate::config::Config;
use crate::cookies::{self, CookieOptions};
use crate::error::ApiError;
use crate::limiter::{MemoryCache, RateLimiter};
use crate::log_store::{DownloadLog, StoreError};
use crate::mailer::{self, Mailer};
use crate::metrics::Metrics;
use crate::session::{self, SessionCookieNames};
use crate::validator::{self, DownloadPathValidator};
use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::{FromRequest, Request},
    http::{header, HeaderMap},
};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub session_secret: Vec<u8>,
    pub session_cookies: SessionCookieNames,
    pub limiter: RateLimiter,
    /// Same cache the limiter uses, kept for periodic sweeps
    pub counters: Arc<MemoryCache>,
    pub downloads: DownloadLog,
    pub mailer: Option<Arc<dyn Mailer>>,
    pub metrics: Metrics,
    pub paths: DownloadPathValidator,
}

pub type SharedState = Arc<AppState>;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("metrics registry: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl AppState {
    /// Build state from configuration, opening the log store and mail client.
    pub async fn new(config: Config) -> Result<Self, StartupError> {
        let session_secret = match config.auth.session_secret.as_deref() {
            Some(secret) if !secret.is_empty() => secret.as_bytes().to_vec(),
            _ => {
                warn!("auth.session_secret not set; sessions will not survive a restart");
                session::random_secret()
            }
        };

        let counters = Arc::new(MemoryCache::new());
        let downloads = DownloadLog::open(&config.downloads).await?;
        let mailer = mailer::build_mailer(&config.mail);

        Ok(Self {
            session_cookies: SessionCookieNames {
                primary: config.auth.cookie_name.clone(),
                legacy: config.auth.legacy_cookie_names.clone(),
            },
            limiter: RateLimiter::new(counters.clone()),
            counters,
            downloads,
            mailer,
            metrics: Metrics::new()?,
            paths: DownloadPathValidator::new(config.downloads.allowed_path_prefixes.clone()),
            session_secret,
            config,
        })
    }

    /// Replace the mail client.
    pub fn with_mailer(mut self, mailer: Option<Arc<dyn Mailer>>) -> Self {
        self.mailer = mailer;
        self
    }

    /// Cookie attributes shared by everything the service sets.
    pub fn cookie_options(&self) -> CookieOptions {
        CookieOptions {
            secure: self.config.cookies.secure,
            same_site: self.config.cookies.same_site,
            ..CookieOptions::default()
        }
    }

    /// Gate cookie names, current first.
    pub fn gate_cookie_names(&self) -> Vec<&str> {
        std::iter::once(self.config.gate.cookie_name.as_str())
            .chain(self.config.gate.legacy_cookie_names.iter().map(String::as_str))
            .collect()
    }

    /// Email from the gate cookie, if it holds a syntactically valid one.
    pub fn gate_email(&self, headers: &HeaderMap) -> Option<String> {
        let jar = cookies::from_headers(headers);
        self.gate_cookie_names()
            .into_iter()
            .filter_map(|name| jar.get(name))
            .find_map(|value| validator::validate_email(value).ok())
    }

    /// The request's own `scheme://host`, as seen by the client.
    pub fn own_origin(&self, headers: &HeaderMap) -> Option<String> {
        let trust = self.config.server.trust_forwarded_headers;
        let forwarded = |name: &str| {
            trust
                .then(|| headers.get(name))
                .flatten()
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };

        let host = forwarded("x-forwarded-host").or_else(|| {
            headers
                .get(header::HOST)
                .and_then(|v| v.to_str().ok())
                .filter(|v| !v.is_empty())
        })?;
        let scheme = forwarded("x-forwarded-proto").unwrap_or(self.config.server.public_scheme.as_str());
        Some(format!("{scheme}://{host}"))
    }

    /// Same-origin check against this request's origin and the configured CORS origin.
    pub fn check_origin(&self, headers: &HeaderMap) -> Result<(), ApiError> {
        let own = self.own_origin(headers);
        validator::check_same_origin(
            headers,
            own.as_deref(),
            self.config.cors.allowed_origin.as_deref(),
        )?;
        Ok(())
    }
}

/// Parse a JSON request body; blank bodies read as `{}`.
pub fn parse_json<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ApiError> {
    let bytes = if bytes.iter().all(u8::is_ascii_whitespace) {
        b"{}".as_slice()
    } else {
        bytes
    };
    serde_json::from_slice(bytes)
        .map_err(|err| ApiError::BadRequest(format!("invalid JSON body: {err}")))
}

/// JSON body extractor that rejects with the error envelope.
///
/// The content type is not checked so `text/plain` beacons are accepted.
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|err| ApiError::BadRequest(err.body_text()))?;
        parse_json(&bytes).map(JsonBody)
    }
}
