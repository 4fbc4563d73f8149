// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: Apache-2.0

//! Request validation.
//!
//! - Email syntax for the download gate and log rows
//! - Download path resolution for notify requests
//! - Same-origin check for state-changing endpoints

use axum::http::{header, HeaderMap};
use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;
use tracing::debug;
use url::Url;

/// One `@`, a dot somewhere in the domain part, no whitespace.
static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap()
});

const MAX_EMAIL_LEN: usize = 254;
const MAX_TITLE_CHARS: usize = 200;

/// Validation error types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("invalid value for field: {0}")]
    InvalidField(&'static str),

    #[error("invalid email address")]
    InvalidEmail,

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("path not allowed: {0}")]
    PathNotAllowed(String),

    #[error("cross-origin request rejected")]
    CrossOrigin { origin: String },
}

/// Validate a gate or log email and return it trimmed.
pub fn validate_email(email: &str) -> Result<String, ValidationError> {
    let email = email.trim();
    if email.is_empty() {
        return Err(ValidationError::MissingField("email"));
    }
    if email.len() > MAX_EMAIL_LEN || !EMAIL_REGEX.is_match(email) {
        debug!(len = email.len(), "email rejected");
        return Err(ValidationError::InvalidEmail);
    }
    Ok(email.to_string())
}

/// Trim a title, dropping it when blank and capping its length.
pub fn normalize_title(title: Option<&str>) -> Option<String> {
    let title = title?.trim();
    if title.is_empty() {
        return None;
    }
    Some(title.chars().take(MAX_TITLE_CHARS).collect())
}

/// Resolves the file a notify request refers to.
pub struct DownloadPathValidator {
    allowed_prefixes: Vec<String>,
}

impl DownloadPathValidator {
    /// Create a validator; an empty prefix list accepts any absolute path.
    pub fn new(allowed_prefixes: Vec<String>) -> Self {
        Self { allowed_prefixes }
    }

    /// Reduce a path or absolute URL to a site path and check it against the allow list.
    pub fn resolve(&self, raw: &str) -> Result<String, ValidationError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ValidationError::MissingField("path"));
        }

        let path = if raw.starts_with("http://") || raw.starts_with("https://") {
            let url = Url::parse(raw).map_err(|_| ValidationError::InvalidPath(raw.to_string()))?;
            if url.host_str().is_none() {
                return Err(ValidationError::InvalidPath(raw.to_string()));
            }
            url.path().to_string()
        } else {
            raw.split(['?', '#']).next().unwrap_or_default().to_string()
        };

        if !path.starts_with('/') || path.starts_with("//") {
            return Err(ValidationError::InvalidPath(path));
        }

        let decoded = urlencoding::decode(&path)
            .map(|p| p.into_owned())
            .map_err(|_| ValidationError::InvalidPath(path.clone()))?;
        if decoded.chars().any(char::is_control)
            || decoded.split(['/', '\\']).any(|segment| segment == "..")
        {
            return Err(ValidationError::InvalidPath(path));
        }

        if !self.allowed_prefixes.is_empty()
            && !self
                .allowed_prefixes
                .iter()
                .any(|prefix| path.starts_with(prefix.as_str()))
        {
            debug!(path = %path, "download path outside allowed prefixes");
            return Err(ValidationError::PathNotAllowed(path));
        }

        Ok(path)
    }
}

/// Reject requests whose `Origin` (or `Referer`) names a different site.
///
/// Requests carrying neither header pass, so headless clients keep working.
/// `own_origin` is the request's own `scheme://host`; `allowed_origin` is the
/// configured CORS origin, which is also accepted.
pub fn check_same_origin(
    headers: &HeaderMap,
    own_origin: Option<&str>,
    allowed_origin: Option<&str>,
) -> Result<(), ValidationError> {
    let claimed = headers
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .or_else(|| {
            headers
                .get(header::REFERER)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        });

    let Some(claimed) = claimed else {
        return Ok(());
    };

    let claimed_origin = Url::parse(claimed).ok().map(|url| url.origin());
    let matches = |candidate: Option<&str>| {
        let candidate = candidate.and_then(|c| Url::parse(c).ok()).map(|url| url.origin());
        match (&claimed_origin, candidate) {
            (Some(claimed), Some(candidate)) => claimed.is_tuple() && *claimed == candidate,
            _ => false,
        }
    };

    if matches(own_origin) || matches(allowed_origin) {
        Ok(())
    } else {
        debug!(origin = %claimed, own = ?own_origin, "origin mismatch");
        Err(ValidationError::CrossOrigin {
            origin: claimed.to_string(),
        })
    }
}

/// Constant-time comparison to prevent timing attacks.
///
/// Length differences return early; the lengths of secrets are not hidden.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}
