// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Request-scoped middleware.
//!
//! - [`request_context`]: request id, client info, error envelope stamping,
//!   metrics and the one log line per request
//! - [`cors`]: CORS headers on every response and short-circuited preflights
//! - [`panic_response`]: turns a caught panic into the 500 envelope

use crate::error::{ApiError, ErrorEnvelope};
use crate::handlers::SharedState;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::any::Any;
use std::fmt;
use std::net::SocketAddr;
use std::time::Instant;
use tracing::{error, info, warn, Instrument};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Random per-request correlation id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(String);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who sent the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub ip: String,
    pub user_agent: Option<String>,
}

impl ClientInfo {
    /// Proxy headers win when trusted, then the socket peer.
    pub fn from_parts(headers: &HeaderMap, peer: Option<SocketAddr>, trust_forwarded: bool) -> Self {
        let header_ip = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let forwarded = if trust_forwarded {
            header_ip("cf-connecting-ip")
                .or_else(|| header_ip("x-real-ip"))
                .or_else(|| header_ip("x-forwarded-for"))
        } else {
            None
        };

        Self {
            ip: forwarded
                .or_else(|| peer.map(|addr| addr.ip().to_string()))
                .unwrap_or_else(|| "unknown".to_string()),
            user_agent: headers
                .get(header::USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        }
    }
}

/// Outermost layer: everything a request carries through the stack and the
/// single terminal log line.
pub async fn request_context(
    State(state): State<SharedState>,
    mut request: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    let request_id = RequestId::new();
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client = ClientInfo::from_parts(
        request.headers(),
        peer,
        state.config.server.trust_forwarded_headers,
    );
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    request.extensions_mut().insert(request_id.clone());
    request.extensions_mut().insert(client.clone());

    let span = tracing::info_span!("request", request_id = %request_id);
    let mut response = next.run(request).instrument(span).await;

    if let Some(mut envelope) = response.extensions_mut().remove::<ErrorEnvelope>() {
        envelope.request_id = request_id.to_string();
        response.headers_mut().remove(header::CONTENT_LENGTH);
        *response.body_mut() = envelope.into_body();
    }
    if let Ok(value) = HeaderValue::from_str(request_id.as_str()) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }

    let status = response.status();
    state.metrics.observe_response(method.as_str(), status.as_u16());

    let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    let ua = client.user_agent.as_deref().unwrap_or("-");
    let status_code = status.as_u16();
    if status.is_server_error() {
        error!(request_id = %request_id, method = %method, path = %path, ip = %client.ip, ua, status = status_code, latency_ms, outcome = "error", "request finished");
    } else if status.is_client_error() {
        warn!(request_id = %request_id, method = %method, path = %path, ip = %client.ip, ua, status = status_code, latency_ms, outcome = "rejected", "request finished");
    } else {
        info!(request_id = %request_id, method = %method, path = %path, ip = %client.ip, ua, status = status_code, latency_ms, outcome = "ok", "request finished");
    }

    response
}

/// CORS for credentialed requests. Preflights never reach a handler.
pub async fn cors(State(state): State<SharedState>, request: Request, next: Next) -> Response {
    let cors = &state.config.cors;
    let allow_origin = cors
        .allowed_origin
        .clone()
        .or_else(|| {
            request
                .headers()
                .get(header::ORIGIN)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        })
        .or_else(|| state.own_origin(request.headers()));

    let preflight = request.method() == Method::OPTIONS;
    let mut response = if preflight {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(request).await
    };

    let headers = response.headers_mut();
    if let Some(origin) = allow_origin.and_then(|o| HeaderValue::from_str(&o).ok()) {
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    }
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
    );
    if let Ok(value) = HeaderValue::from_str(&cors.allow_headers) {
        headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, value);
    }
    if let Ok(value) = HeaderValue::from_str(&cors.allow_methods) {
        headers.insert(header::ACCESS_CONTROL_ALLOW_METHODS, value);
    }
    headers.append(header::VARY, HeaderValue::from_static("Origin"));
    if preflight {
        headers.insert(header::ACCESS_CONTROL_MAX_AGE, HeaderValue::from(cors.max_age_secs));
    }

    response
}

/// Handler for `CatchPanicLayer`: log the payload, answer with the 500 envelope.
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    };
    ApiError::Internal(format!("handler panicked: {detail}")).into_response()
}
