// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Prometheus counters for the edge service.

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

const NAMESPACE: &str = "portfolio_edge";

/// Per-process metrics registry.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    http_requests: IntCounterVec,
    notify_rate_limited: IntCounter,
    downloads_logged: IntCounter,
    mail_failures: IntCounter,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let http_requests = IntCounterVec::new(
            Opts::new("http_requests_total", "HTTP responses by method and status class")
                .namespace(NAMESPACE),
            &["method", "status"],
        )?;
        registry.register(Box::new(http_requests.clone()))?;

        let notify_rate_limited = IntCounter::with_opts(
            Opts::new("notify_rate_limited_total", "Notify calls rejected by the rate limiter")
                .namespace(NAMESPACE),
        )?;
        registry.register(Box::new(notify_rate_limited.clone()))?;

        let downloads_logged = IntCounter::with_opts(
            Opts::new("downloads_logged_total", "Rows appended to the download log")
                .namespace(NAMESPACE),
        )?;
        registry.register(Box::new(downloads_logged.clone()))?;

        let mail_failures = IntCounter::with_opts(
            Opts::new("mail_failures_total", "Download notification mails that failed to send")
                .namespace(NAMESPACE),
        )?;
        registry.register(Box::new(mail_failures.clone()))?;

        Ok(Self {
            registry,
            http_requests,
            notify_rate_limited,
            downloads_logged,
            mail_failures,
        })
    }

    pub fn observe_response(&self, method: &str, status: u16) {
        let class = match status {
            100..=199 => "1xx",
            200..=299 => "2xx",
            300..=399 => "3xx",
            400..=499 => "4xx",
            _ => "5xx",
        };
        self.http_requests.with_label_values(&[method, class]).inc();
    }

    pub fn notify_rate_limited(&self) {
        self.notify_rate_limited.inc();
    }

    pub fn download_logged(&self) {
        self.downloads_logged.inc();
    }

    pub fn mail_failed(&self) {
        self.mail_failures.inc();
    }

    /// Prometheus text exposition of every registered metric.
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        if let Err(err) = TextEncoder::new().encode(&self.registry.gather(), &mut buffer) {
            tracing::warn!(error = %err, "failed to encode metrics");
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}
