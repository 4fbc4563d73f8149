// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Append-only download log.
//!
//! Rows are inserted once and never updated or deleted. Reads filter on an
//! inclusive timestamp range and always return newest first, whatever order
//! the rows arrived in.

pub mod db;
pub mod export;
pub mod handlers;

pub use db::Database;

use crate::config::DownloadLogConfig;
use crate::validator::{self, ValidationError};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

const MAX_ID_LEN: usize = 64;
const MAX_FIELD_CHARS: usize = 512;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("id already exists: {0}")]
    DuplicateId(String),

    #[error("database error: {0}")]
    Database(#[from] surrealdb::Error),

    #[error("unsupported storage: {0}")]
    Unsupported(String),
}

/// One recorded download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadLogRow {
    pub id: String,
    /// Milliseconds since the unix epoch
    pub ts: i64,
    pub email: String,
    pub path: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub ua: Option<String>,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub referer: Option<String>,
}

/// Append request body; everything optional so validation can name what is missing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppendInput {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub ts: Option<i64>,
    #[serde(default)]
    pub ua: Option<String>,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub referer: Option<String>,
}

/// Inclusive timestamp bounds in milliseconds; either side may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeRange {
    pub from: Option<i64>,
    pub to: Option<i64>,
}

impl TimeRange {
    pub fn contains(&self, ts: i64) -> bool {
        self.from.map_or(true, |from| ts >= from) && self.to.map_or(true, |to| ts <= to)
    }
}

/// The download log store.
#[derive(Clone)]
pub struct DownloadLog {
    db: Database,
    default_limit: usize,
    max_limit: usize,
}

impl DownloadLog {
    /// Open the store described by the configuration.
    pub async fn open(config: &DownloadLogConfig) -> Result<Self, StoreError> {
        let db = Database::connect(&config.storage).await?;
        info!(storage = %config.storage, "download log ready");
        Ok(Self::new(db, config.default_limit, config.max_limit))
    }

    pub fn new(db: Database, default_limit: usize, max_limit: usize) -> Self {
        let max_limit = max_limit.max(1);
        Self {
            db,
            default_limit: default_limit.clamp(1, max_limit),
            max_limit,
        }
    }

    /// Requested limit, defaulted and clamped to `[1, max_limit]`.
    pub fn effective_limit(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_limit)
            .clamp(1, self.max_limit)
    }

    /// Validate and insert a row, returning its id.
    pub async fn append(&self, input: AppendInput) -> Result<String, StoreError> {
        let row = Self::build_row(input, Utc::now().timestamp_millis())?;
        self.db.insert(&row).await?;

        debug!(id = %row.id, path = %row.path, "download row appended");
        Ok(row.id)
    }

    /// Rows within `range`, newest first.
    pub async fn query(
        &self,
        range: TimeRange,
        limit: Option<usize>,
    ) -> Result<Vec<DownloadLogRow>, StoreError> {
        self.db.range(range, self.effective_limit(limit)).await
    }

    /// Same selection as [`query`](Self::query), rendered as CSV.
    pub async fn export_csv(
        &self,
        range: TimeRange,
        limit: Option<usize>,
    ) -> Result<String, StoreError> {
        let rows = self.query(range, limit).await?;
        Ok(export::render_csv(&rows))
    }

    fn build_row(input: AppendInput, now_ms: i64) -> Result<DownloadLogRow, ValidationError> {
        let email = validator::validate_email(input.email.as_deref().unwrap_or_default())?;

        let path = input
            .path
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .ok_or(ValidationError::MissingField("path"))?;
        if !path.starts_with('/') {
            return Err(ValidationError::InvalidPath(path.to_string()));
        }

        let id = match input.id.map(|id| id.trim().to_string()) {
            Some(id) if !id.is_empty() => {
                let well_formed = id.len() <= MAX_ID_LEN
                    && id
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
                if !well_formed {
                    return Err(ValidationError::InvalidField("id"));
                }
                id
            }
            _ => Uuid::new_v4().to_string(),
        };

        let ts = match input.ts {
            Some(ts) if ts < 0 => return Err(ValidationError::InvalidField("ts")),
            Some(ts) => ts,
            None => now_ms,
        };

        Ok(DownloadLogRow {
            id,
            ts,
            email,
            path: path.to_string(),
            title: validator::normalize_title(input.title.as_deref()),
            ua: clip(input.ua),
            ip: clip(input.ip),
            referer: clip(input.referer),
        })
    }
}

fn clip(value: Option<String>) -> Option<String> {
    let value = value?;
    let value = value.trim();
    (!value.is_empty()).then(|| value.chars().take(MAX_FIELD_CHARS).collect())
}
