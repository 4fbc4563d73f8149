// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Download gate email.
//!
//! The gate cookie records an email the visitor typed in. It unlocks download
//! links and nothing else; it is never treated as a login.

use super::{auth::OkResponse, JsonBody, SharedState};
use crate::cookies::{self, CookieOptions};
use crate::error::Result;
use crate::validator;
use axum::{
    extract::State,
    http::{header, HeaderMap},
    response::{AppendHeaders, IntoResponse},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Default, Deserialize)]
pub struct EmailRequest {
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EmailResponse {
    pub ok: bool,
    pub email: Option<String>,
}

/// `POST /email`
pub async fn set(
    State(state): State<SharedState>,
    headers: HeaderMap,
    JsonBody(body): JsonBody<EmailRequest>,
) -> Result<impl IntoResponse> {
    state.check_origin(&headers)?;
    let email = validator::validate_email(body.email.as_deref().unwrap_or_default())?;

    let gate = &state.config.gate;
    let cookie = cookies::serialize(
        &gate.cookie_name,
        &email,
        &CookieOptions {
            max_age: Some(gate.max_age_secs),
            ..state.cookie_options()
        },
    );

    debug!("gate email set");
    Ok((
        AppendHeaders([(header::SET_COOKIE, cookie)]),
        Json(EmailResponse {
            ok: true,
            email: Some(email),
        }),
    ))
}

/// `GET /email`
pub async fn current(State(state): State<SharedState>, headers: HeaderMap) -> Json<EmailResponse> {
    Json(EmailResponse {
        ok: true,
        email: state.gate_email(&headers),
    })
}

/// `POST /email/clear`
pub async fn clear(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse> {
    state.check_origin(&headers)?;
    let cleared = cookies::clear_all(
        &state.gate_cookie_names(),
        &state.config.cookies.domains,
        &state.cookie_options(),
    );

    Ok((
        AppendHeaders(cleared.into_iter().map(|c| (header::SET_COOKIE, c))),
        Json(OkResponse { ok: true }),
    ))
}
