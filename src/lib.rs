// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Portfolio Edge
//!
//! Edge backend for a personal portfolio site:
//!
//! - Email gate for downloads (cookie set on `POST /email`, checked on notify
//!   and, when the site is served from here, on protected static paths)
//! - Demo login with stateless HMAC-signed session cookies
//! - Fixed-window rate limiting of download notifications
//! - Append-only download log with JSON and CSV export
//! - Best-effort notification mail for each logged download
//!
//! Every error leaves as `{ok:false, error, requestId, details?}`.

pub mod config;
pub mod cookies;
pub mod error;
pub mod handlers;
pub mod limiter;
pub mod log_store;
pub mod mailer;
pub mod metrics;
pub mod middleware;
pub mod router;
pub mod session;
pub mod site;
pub mod validator;

pub use config::Config;
pub use error::{ApiError, ErrorEnvelope};
pub use handlers::{AppState, SharedState};
pub use limiter::{CounterCache, MemoryCache, RateLimiter};
pub use log_store::{DownloadLog, DownloadLogRow};
pub use mailer::{MailMessage, Mailer};
pub use router::build_router;
