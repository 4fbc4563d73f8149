// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Configuration for the portfolio edge service.
//!
//! Values come from an optional TOML file and from environment variables
//! prefixed with `PORTFOLIO_`, nested with a double underscore:
//!
//! - `PORTFOLIO_BIND_ADDR=0.0.0.0:8787`
//! - `PORTFOLIO_AUTH__SESSION_SECRET=...`
//! - `PORTFOLIO_DOWNLOADS__EXPORT_USER=admin`
//! - `PORTFOLIO_GATE__PROTECTED_PREFIXES=/assets/downloads/,/private/`

use crate::cookies::SameSite;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "PORTFOLIO";

/// Keys that are split on commas when read from the environment.
const LIST_KEYS: &[&str] = &[
    "cookies.domains",
    "auth.legacy_cookie_names",
    "gate.legacy_cookie_names",
    "gate.protected_prefixes",
    "downloads.allowed_path_prefixes",
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server bind address (default: 0.0.0.0:8787)
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Prefix shared by every API route (default: /api)
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub cors: CorsConfig,

    #[serde(default)]
    pub cookies: CookieConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub gate: GateConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub downloads: DownloadLogConfig,

    #[serde(default)]
    pub mail: MailConfig,

    #[serde(default)]
    pub site: SiteConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// How the service learns about its own public origin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Scheme assumed for same-origin checks when no forwarded proto is present
    #[serde(default = "default_public_scheme")]
    pub public_scheme: String,

    /// Honour `x-forwarded-*`, `cf-connecting-ip` and `x-real-ip` (default: false).
    /// Only enable behind a proxy that overwrites them; a direct client can
    /// otherwise pick its own rate-limit key.
    #[serde(default)]
    pub trust_forwarded_headers: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Origin echoed in `Access-Control-Allow-Origin`; falls back to the request origin
    #[serde(default)]
    pub allowed_origin: Option<String>,

    #[serde(default = "default_allow_headers")]
    pub allow_headers: String,

    #[serde(default = "default_allow_methods")]
    pub allow_methods: String,

    /// Preflight cache lifetime in seconds
    #[serde(default = "default_cors_max_age")]
    pub max_age_secs: u64,
}

/// Attributes shared by every cookie the service writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CookieConfig {
    #[serde(default = "default_true")]
    pub secure: bool,

    #[serde(default)]
    pub same_site: SameSite,

    /// Domain variants cleared on logout and email clear; "" is host-only
    #[serde(default = "default_cookie_domains")]
    pub domains: Vec<String>,
}

/// Demo login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Demo username; login is disabled when unset
    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// HMAC secret for session tokens; a random one is generated when unset
    #[serde(default)]
    pub session_secret: Option<String>,

    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,

    #[serde(default = "default_session_cookie")]
    pub cookie_name: String,

    /// Older cookie names still accepted on read and cleared on logout
    #[serde(default)]
    pub legacy_cookie_names: Vec<String>,
}

/// Email gate for downloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    #[serde(default = "default_gate_cookie")]
    pub cookie_name: String,

    #[serde(default)]
    pub legacy_cookie_names: Vec<String>,

    /// Gate cookie lifetime (default: one year)
    #[serde(default = "default_gate_max_age")]
    pub max_age_secs: u64,

    /// Static paths that require the gate cookie when served by this process
    #[serde(default = "default_protected_prefixes")]
    pub protected_prefixes: Vec<String>,
}

/// Fixed-window limits for the notify endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Requests allowed per window per client (default: 20)
    #[serde(default = "default_notify_limit")]
    pub notify_limit: u32,

    /// Window length in seconds (default: 60)
    #[serde(default = "default_window_secs")]
    pub notify_window_secs: u64,

    /// How often expired counters are swept from memory
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,
}

/// Download log store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadLogConfig {
    /// "memory" or a filesystem path (requires the `rocksdb` feature)
    #[serde(default = "default_storage")]
    pub storage: String,

    /// Where the log store routes are mounted (default: /api/downloads)
    #[serde(default = "default_downloads_mount")]
    pub mount: String,

    #[serde(default)]
    pub export_user: Option<String>,

    #[serde(default)]
    pub export_password: Option<String>,

    /// Serve exports without credentials when none are configured (default: false)
    #[serde(default)]
    pub allow_open_export: bool,

    #[serde(default = "default_export_limit")]
    pub default_limit: usize,

    #[serde(default = "default_export_max_limit")]
    pub max_limit: usize,

    /// Paths the notify endpoint accepts; empty accepts any absolute path
    #[serde(default = "default_allowed_path_prefixes")]
    pub allowed_path_prefixes: Vec<String>,
}

/// Transactional mail provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    /// Provider endpoint; notifications are skipped when unset
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_mail_from")]
    pub from: String,

    /// Recipient of download notifications
    #[serde(default)]
    pub to: Option<String>,

    #[serde(default = "default_mail_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Directory with the built static site; API-only when unset
    #[serde(default)]
    pub root: Option<PathBuf>,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable Prometheus metrics endpoint (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics endpoint path (default: /metrics)
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// JSON log lines (default: true); plain text otherwise
    #[serde(default = "default_true")]
    pub json: bool,
}

// Default value functions
fn default_bind_addr() -> String {
    "0.0.0.0:8787".to_string()
}

fn default_api_prefix() -> String {
    "/api".to_string()
}

fn default_public_scheme() -> String {
    "https".to_string()
}

fn default_allow_headers() -> String {
    "Content-Type, Authorization".to_string()
}

fn default_allow_methods() -> String {
    "GET, POST, OPTIONS".to_string()
}

fn default_cors_max_age() -> u64 {
    86_400
}

fn default_cookie_domains() -> Vec<String> {
    vec![String::new()]
}

fn default_session_ttl() -> u64 {
    7 * 24 * 60 * 60
}

fn default_session_cookie() -> String {
    "session".to_string()
}

fn default_gate_cookie() -> String {
    "dl_email".to_string()
}

fn default_gate_max_age() -> u64 {
    365 * 24 * 60 * 60
}

fn default_protected_prefixes() -> Vec<String> {
    vec!["/assets/downloads/".to_string()]
}

fn default_notify_limit() -> u32 {
    20
}

fn default_window_secs() -> u64 {
    60
}

fn default_cleanup_interval() -> u64 {
    60
}

fn default_storage() -> String {
    "memory".to_string()
}

fn default_downloads_mount() -> String {
    "/api/downloads".to_string()
}

fn default_export_limit() -> usize {
    5_000
}

fn default_export_max_limit() -> usize {
    100_000
}

fn default_allowed_path_prefixes() -> Vec<String> {
    vec!["/assets/".to_string(), "/downloads/".to_string()]
}

fn default_mail_from() -> String {
    "downloads@localhost".to_string()
}

fn default_mail_timeout() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            api_prefix: default_api_prefix(),
            server: ServerConfig::default(),
            cors: CorsConfig::default(),
            cookies: CookieConfig::default(),
            auth: AuthConfig::default(),
            gate: GateConfig::default(),
            rate_limit: RateLimitConfig::default(),
            downloads: DownloadLogConfig::default(),
            mail: MailConfig::default(),
            site: SiteConfig::default(),
            metrics: MetricsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            public_scheme: default_public_scheme(),
            trust_forwarded_headers: false,
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origin: None,
            allow_headers: default_allow_headers(),
            allow_methods: default_allow_methods(),
            max_age_secs: default_cors_max_age(),
        }
    }
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            secure: default_true(),
            same_site: SameSite::default(),
            domains: default_cookie_domains(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            username: None,
            password: None,
            session_secret: None,
            session_ttl_secs: default_session_ttl(),
            cookie_name: default_session_cookie(),
            legacy_cookie_names: Vec::new(),
        }
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            cookie_name: default_gate_cookie(),
            legacy_cookie_names: Vec::new(),
            max_age_secs: default_gate_max_age(),
            protected_prefixes: default_protected_prefixes(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            notify_limit: default_notify_limit(),
            notify_window_secs: default_window_secs(),
            cleanup_interval_secs: default_cleanup_interval(),
        }
    }
}

impl Default for DownloadLogConfig {
    fn default() -> Self {
        Self {
            storage: default_storage(),
            mount: default_downloads_mount(),
            export_user: None,
            export_password: None,
            allow_open_export: false,
            default_limit: default_export_limit(),
            max_limit: default_export_max_limit(),
            allowed_path_prefixes: default_allowed_path_prefixes(),
        }
    }
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            from: default_mail_from(),
            to: None,
            timeout_secs: default_mail_timeout(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            path: default_metrics_path(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            json: default_true(),
        }
    }
}

impl Config {
    /// Load configuration from an optional file and the `PORTFOLIO_*` environment.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();

        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let mut env = config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .list_separator(",");
        for key in LIST_KEYS {
            env = env.with_list_parse_key(key);
        }

        let config: Config = builder.add_source(env).build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject combinations the service cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.api_prefix.starts_with('/') || self.api_prefix.ends_with('/') {
            return Err(ConfigError::Invalid(format!(
                "api_prefix must start with '/' and not end with one: {:?}",
                self.api_prefix
            )));
        }
        if !self.downloads.mount.starts_with('/') || self.downloads.mount.ends_with('/') {
            return Err(ConfigError::Invalid(format!(
                "downloads.mount must start with '/' and not end with one: {:?}",
                self.downloads.mount
            )));
        }
        if self.downloads.max_limit == 0 || self.downloads.default_limit == 0 {
            return Err(ConfigError::Invalid("export limits must be at least 1".into()));
        }
        if self.downloads.default_limit > self.downloads.max_limit {
            return Err(ConfigError::Invalid(
                "downloads.default_limit exceeds downloads.max_limit".into(),
            ));
        }
        if self.rate_limit.notify_window_secs == 0 {
            return Err(ConfigError::Invalid(
                "rate_limit.notify_window_secs must be at least 1".into(),
            ));
        }
        if self.cookies.same_site == SameSite::None && !self.cookies.secure {
            return Err(ConfigError::Invalid(
                "cookies.same_site = none requires cookies.secure".into(),
            ));
        }
        Ok(())
    }

    /// Whether the export endpoints have any credential configured.
    pub fn export_credentials_configured(&self) -> bool {
        self.downloads.export_user.is_some() || self.downloads.export_password.is_some()
    }
}

impl RateLimitConfig {
    /// Get the sweep interval for expired counters
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs.max(1))
    }
}

impl MailConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.api_prefix, "/api");
        assert_eq!(config.rate_limit.notify_limit, 20);
        assert_eq!(config.downloads.default_limit, 5_000);
        assert_eq!(config.downloads.max_limit, 100_000);
        assert!(!config.downloads.allow_open_export);
        assert!(!config.server.trust_forwarded_headers);
        assert_eq!(config.cookies.domains, vec![String::new()]);
    }

    #[test]
    fn test_rejects_trailing_slash_prefix() {
        let config = Config {
            api_prefix: "/api/".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_default_limit_above_max() {
        let mut config = Config::default();
        config.downloads.default_limit = 10;
        config.downloads.max_limit = 5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_same_site_none_requires_secure() {
        let mut config = Config::default();
        config.cookies.same_site = SameSite::None;
        config.cookies.secure = false;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("edge.toml");
        std::fs::write(
            &path,
            r#"
bind_addr = "127.0.0.1:9000"

[auth]
username = "chris"
password = "hunter2"

[downloads]
export_user = "admin"
default_limit = 50
"#,
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:9000");
        assert_eq!(config.auth.username.as_deref(), Some("chris"));
        assert_eq!(config.auth.cookie_name, "session");
        assert_eq!(config.downloads.default_limit, 50);
        assert!(!config.server.trust_forwarded_headers);
        assert!(config.export_credentials_configured());
    }
}
