// SPDX-License-Identifier: PMPL-1.0-or-later
//! HTTP surface of the download log: append and the two exports.

use super::{export, AppendInput, DownloadLogRow};
use crate::error::{ApiError, Result};
use crate::handlers::{JsonBody, SharedState};
use crate::session::credentials_match;
use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::{header, HeaderMap},
    response::IntoResponse,
    Json,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

const REALM: &str = "downloads";

#[derive(Debug, Default, Deserialize)]
pub struct ExportParams {
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub limit: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AppendResponse {
    pub ok: bool,
    pub id: String,
}

#[derive(Debug, Serialize)]
pub struct ExportResponse {
    pub ok: bool,
    pub count: usize,
    pub rows: Vec<DownloadLogRow>,
}

/// `POST {mount}/append`
pub async fn append(
    State(state): State<SharedState>,
    JsonBody(input): JsonBody<AppendInput>,
) -> Result<Json<AppendResponse>> {
    let id = state.downloads.append(input).await?;
    state.metrics.download_logged();
    Ok(Json(AppendResponse { ok: true, id }))
}

/// `GET {mount}/export.json`
pub async fn export_json(
    State(state): State<SharedState>,
    headers: HeaderMap,
    params: std::result::Result<Query<ExportParams>, QueryRejection>,
) -> Result<Json<ExportResponse>> {
    authorize(&state, &headers)?;
    let (range, limit) = read_params(params)?;

    let rows = state.downloads.query(range, limit).await?;
    info!(count = rows.len(), "download log exported as json");
    Ok(Json(ExportResponse {
        ok: true,
        count: rows.len(),
        rows,
    }))
}

/// `GET {mount}/export.csv`
pub async fn export_csv(
    State(state): State<SharedState>,
    headers: HeaderMap,
    params: std::result::Result<Query<ExportParams>, QueryRejection>,
) -> Result<impl IntoResponse> {
    authorize(&state, &headers)?;
    let (range, limit) = read_params(params)?;

    let csv = state.downloads.export_csv(range, limit).await?;
    info!("download log exported as csv");
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"downloads.csv\"",
            ),
            (header::CACHE_CONTROL, "no-store"),
        ],
        csv,
    ))
}

fn read_params(
    params: std::result::Result<Query<ExportParams>, QueryRejection>,
) -> Result<(super::TimeRange, Option<usize>)> {
    let Query(params) =
        params.map_err(|err| ApiError::BadRequest(format!("invalid query: {}", err.body_text())))?;
    let range = export::parse_range(params.from.as_deref(), params.to.as_deref())?;
    let limit = export::parse_limit(params.limit.as_deref())?;
    Ok((range, limit))
}

/// HTTP Basic check for exports. Without configured credentials exports are
/// refused unless `allow_open_export` is set.
fn authorize(state: &SharedState, headers: &HeaderMap) -> Result<()> {
    let downloads = &state.config.downloads;

    if !state.config.export_credentials_configured() {
        if downloads.allow_open_export {
            return Ok(());
        }
        warn!("export refused: no export credentials configured");
        return Err(ApiError::BasicAuthRequired { realm: REALM });
    }

    let authorized = basic_credentials(headers).is_some_and(|(user, password)| {
        credentials_match(
            downloads.export_user.as_deref(),
            downloads.export_password.as_deref(),
            &user,
            &password,
        )
    });
    if !authorized {
        warn!("export refused: bad credentials");
        return Err(ApiError::BasicAuthRequired { realm: REALM });
    }
    Ok(())
}

/// Decode `Authorization: Basic base64(user:password)`.
fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, password) = decoded.split_once(':')?;
    Some((user.to_string(), password.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn with_auth(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_basic_credentials() {
        let encoded = STANDARD.encode("admin:pa:ss");
        assert_eq!(
            basic_credentials(&with_auth(&format!("Basic {encoded}"))),
            Some(("admin".to_string(), "pa:ss".to_string()))
        );
        assert_eq!(
            basic_credentials(&with_auth(&format!("basic {encoded}"))),
            Some(("admin".to_string(), "pa:ss".to_string()))
        );
        assert_eq!(basic_credentials(&with_auth("Bearer abc")), None);
        assert_eq!(basic_credentials(&with_auth("Basic !!!")), None);
        assert_eq!(basic_credentials(&HeaderMap::new()), None);
    }
}
