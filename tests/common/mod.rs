// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Shared helpers for the end-to-end tests.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, Response},
    Router,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use http_body_util::BodyExt;
use portfolio_edge::{
    build_router,
    mailer::{MailError, MailMessage, Mailer},
    AppState, Config, SharedState,
};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;

pub const USERNAME: &str = "chris";
pub const PASSWORD: &str = "correct horse";
pub const EXPORT_USER: &str = "admin";
pub const EXPORT_PASSWORD: &str = "s3cret";
pub const OWNER: &str = "owner@site.test";

/// Mailer that records every message and optionally fails.
pub struct MockMailer {
    sent: mpsc::UnboundedSender<MailMessage>,
    fail: bool,
}

impl MockMailer {
    pub fn new(fail: bool) -> (Arc<Self>, mpsc::UnboundedReceiver<MailMessage>) {
        let (sent, received) = mpsc::unbounded_channel();
        (Arc::new(Self { sent, fail }), received)
    }
}

#[async_trait]
impl Mailer for MockMailer {
    async fn send(&self, message: MailMessage) -> Result<(), MailError> {
        let _ = self.sent.send(message);
        if self.fail {
            Err(MailError::Rejected { status: 503 })
        } else {
            Ok(())
        }
    }
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    // Requests carry a client address in x-forwarded-for, as behind a proxy.
    config.server.trust_forwarded_headers = true;
    config.auth.username = Some(USERNAME.to_string());
    config.auth.password = Some(PASSWORD.to_string());
    config.auth.session_secret = Some("integration-test-secret".to_string());
    config.downloads.export_user = Some(EXPORT_USER.to_string());
    config.downloads.export_password = Some(EXPORT_PASSWORD.to_string());
    config.mail.to = Some(OWNER.to_string());
    config
}

pub async fn app_with(config: Config, mailer: Option<Arc<dyn Mailer>>) -> (Router, SharedState) {
    let state = Arc::new(AppState::new(config).await.unwrap().with_mailer(mailer));
    (build_router(state.clone()), state)
}

pub async fn app() -> Router {
    app_with(test_config(), None).await.0
}

pub fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-forwarded-for", "203.0.113.5")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub fn with_cookie(mut request: Request<Body>, cookie: &str) -> Request<Body> {
    request
        .headers_mut()
        .insert(header::COOKIE, cookie.parse().unwrap());
    request
}

pub fn with_basic_auth(mut request: Request<Body>, user: &str, password: &str) -> Request<Body> {
    let encoded = STANDARD.encode(format!("{user}:{password}"));
    request.headers_mut().insert(
        header::AUTHORIZATION,
        format!("Basic {encoded}").parse().unwrap(),
    );
    request
}

/// Every `Set-Cookie` value on a response.
pub fn set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect()
}

/// `name=value` part of a `Set-Cookie` value, ready for a `Cookie` header.
pub fn cookie_pair(set_cookie: &str) -> String {
    set_cookie.split(';').next().unwrap().to_string()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}
