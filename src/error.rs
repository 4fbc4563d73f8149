// SPDX-License-Identifier: PMPL-1.0-or-later
//! Error taxonomy and the JSON error envelope.
//!
//! Every failure leaves the service as
//! `{ "ok": false, "error": "...", "requestId": "...", "details": ... }`.
//! Handlers return [`ApiError`]; the request-context middleware stamps the
//! request id into the envelope once it is known.

use crate::log_store::StoreError;
use crate::validator::ValidationError;
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::error;

/// Application error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    BadRequest(String),

    #[error("not authenticated")]
    Unauthorized,

    #[error("email required before downloading")]
    GateRequired,

    #[error("valid credentials required")]
    BasicAuthRequired { realm: &'static str },

    #[error("not found")]
    NotFound,

    #[error("method not allowed (allowed: {allow})")]
    MethodNotAllowed { allow: &'static str },

    #[error("too many requests")]
    RateLimited { retry_after_secs: u64 },

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(ValidationError::CrossOrigin { .. }) => StatusCode::FORBIDDEN,
            Self::Validation(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Store(StoreError::Validation(_)) => StatusCode::BAD_REQUEST,
            Self::Store(StoreError::DuplicateId(_)) => StatusCode::CONFLICT,
            Self::Unauthorized | Self::GateRequired | Self::BasicAuthRequired { .. } => {
                StatusCode::UNAUTHORIZED
            }
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Store(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to clients.
    fn public_message(&self) -> String {
        match self {
            Self::Validation(ValidationError::CrossOrigin { .. }) => {
                "cross-origin request rejected".to_string()
            }
            Self::Store(StoreError::Validation(err)) => err.to_string(),
            Self::Store(StoreError::DuplicateId(_)) => "duplicate id".to_string(),
            Self::Store(_) | Self::Internal(_) => "internal error".to_string(),
            other => other.to_string(),
        }
    }

    fn details(&self) -> Option<Value> {
        match self {
            Self::Validation(ValidationError::MissingField(field))
            | Self::Store(StoreError::Validation(ValidationError::MissingField(field))) => {
                Some(json!({ "field": field }))
            }
            Self::RateLimited { retry_after_secs } => {
                Some(json!({ "retryAfter": retry_after_secs }))
            }
            Self::MethodNotAllowed { allow } => Some(json!({ "allow": allow })),
            _ => None,
        }
    }
}

/// Error response body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    pub ok: bool,
    pub error: String,
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ErrorEnvelope {
    pub fn new(error: impl Into<String>, details: Option<Value>) -> Self {
        Self {
            ok: false,
            error: error.into(),
            request_id: String::new(),
            details,
        }
    }

    /// Build the JSON body for this envelope.
    pub fn into_body(self) -> axum::body::Body {
        // A struct of strings and JSON values always serializes.
        axum::body::Body::from(serde_json::to_vec(&self).unwrap_or_default())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }

        let envelope = ErrorEnvelope::new(self.public_message(), self.details());
        let mut response = (status, Json(envelope.clone())).into_response();
        let headers = response.headers_mut();

        match &self {
            Self::BasicAuthRequired { realm } => {
                if let Ok(value) = HeaderValue::from_str(&format!("Basic realm=\"{realm}\"")) {
                    headers.insert(header::WWW_AUTHENTICATE, value);
                }
            }
            Self::RateLimited { retry_after_secs } => {
                headers.insert(header::RETRY_AFTER, HeaderValue::from(*retry_after_secs));
            }
            Self::MethodNotAllowed { allow } => {
                headers.insert(header::ALLOW, HeaderValue::from_static(allow));
            }
            _ => {}
        }

        response.extensions_mut().insert(envelope);
        response
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::from(ValidationError::InvalidEmail).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(ValidationError::CrossOrigin {
                origin: "https://evil.test".into()
            })
            .status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(ApiError::GateRequired.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ApiError::RateLimited { retry_after_secs: 5 }.status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ApiError::from(StoreError::DuplicateId("r1".into())).status(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_internal_details_are_hidden() {
        let err = ApiError::Internal("db password is hunter2".into());
        assert_eq!(err.public_message(), "internal error");
        let err = ApiError::from(StoreError::Unsupported("/var/lib/secret.db".into()));
        assert_eq!(err.public_message(), "internal error");
    }

    #[test]
    fn test_response_headers_and_extension() {
        let response = ApiError::BasicAuthRequired { realm: "downloads" }.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers()[header::WWW_AUTHENTICATE],
            "Basic realm=\"downloads\""
        );
        assert!(response.extensions().get::<ErrorEnvelope>().is_some());

        let response = ApiError::RateLimited { retry_after_secs: 42 }.into_response();
        assert_eq!(response.headers()[header::RETRY_AFTER], "42");

        let response = ApiError::MethodNotAllowed { allow: "GET" }.into_response();
        assert_eq!(response.headers()[header::ALLOW], "GET");
    }

    #[test]
    fn test_envelope_shape() {
        let mut envelope = ErrorEnvelope::new("not found", None);
        envelope.request_id = "abc".into();
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value, json!({ "ok": false, "error": "not found", "requestId": "abc" }));
    }
}
