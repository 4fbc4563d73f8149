// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Demo login backed by signed session cookies.

use super::{JsonBody, SharedState};
use crate::cookies::{self, CookieOptions};
use crate::error::{ApiError, Result};
use crate::session;
use crate::validator::ValidationError;
use axum::{
    extract::State,
    http::{header, HeaderMap},
    response::{AppendHeaders, IntoResponse},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Default, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct User {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub ok: bool,
    pub user: User,
}

#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub ok: bool,
}

/// `POST /auth/login`, `POST /login`
pub async fn login(
    State(state): State<SharedState>,
    headers: HeaderMap,
    JsonBody(body): JsonBody<LoginRequest>,
) -> Result<impl IntoResponse> {
    state.check_origin(&headers)?;

    let username = body
        .username
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .ok_or(ValidationError::MissingField("username"))?;
    let password = body
        .password
        .filter(|p| !p.is_empty())
        .ok_or(ValidationError::MissingField("password"))?;

    let auth = &state.config.auth;
    if !session::credentials_match(
        auth.username.as_deref(),
        auth.password.as_deref(),
        &username,
        &password,
    ) {
        warn!(user = %username, "login rejected");
        return Err(ApiError::Unauthorized);
    }

    let token = session::create(
        &state.session_secret,
        &username,
        Utc::now().timestamp(),
        Some(auth.session_ttl_secs),
    )
    .map_err(|err| ApiError::Internal(err.to_string()))?;
    let cookie = cookies::serialize(
        &auth.cookie_name,
        &token,
        &CookieOptions {
            http_only: true,
            max_age: Some(auth.session_ttl_secs),
            ..state.cookie_options()
        },
    );

    info!(user = %username, "login succeeded");
    Ok((
        AppendHeaders([(header::SET_COOKIE, cookie)]),
        Json(UserResponse {
            ok: true,
            user: User { name: username },
        }),
    ))
}

/// `GET /auth/me`, `GET /me`
pub async fn me(State(state): State<SharedState>, headers: HeaderMap) -> Result<Json<UserResponse>> {
    let token = state
        .session_cookies
        .read_token(&headers)
        .ok_or(ApiError::Unauthorized)?;
    let claims = session::verify(&state.session_secret, &token, Utc::now().timestamp())
        .ok_or(ApiError::Unauthorized)?;

    Ok(Json(UserResponse {
        ok: true,
        user: User {
            name: claims.subject,
        },
    }))
}

/// `POST /auth/logout`, `POST /logout`
///
/// Clears the session cookie under every configured name and domain variant.
pub async fn logout(State(state): State<SharedState>) -> impl IntoResponse {
    let cleared = cookies::clear_all(
        &state.session_cookies.all(),
        &state.config.cookies.domains,
        &CookieOptions {
            http_only: true,
            ..state.cookie_options()
        },
    );

    (
        AppendHeaders(cleared.into_iter().map(|c| (header::SET_COOKIE, c))),
        Json(OkResponse { ok: true }),
    )
}
