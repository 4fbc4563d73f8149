// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Download notification.
//!
//! Called by the site when a visitor starts a gated download. The row is
//! logged and the owner is mailed, but neither step may block the download:
//! log failures come back as a `warning`, mail failures are only logged.

use super::{parse_json, SharedState};
use crate::error::{ApiError, Result};
use crate::log_store::AppendInput;
use crate::mailer;
use crate::middleware::ClientInfo;
use crate::validator::{self, ValidationError};
use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Body sent by the site; the file may arrive under any of four names.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifyRequest {
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub href: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

impl NotifyRequest {
    fn target(&self) -> Option<&str> {
        [&self.file_path, &self.path, &self.url, &self.href]
            .into_iter()
            .filter_map(|v| v.as_deref())
            .map(str::trim)
            .find(|v| !v.is_empty())
    }
}

#[derive(Debug, Serialize)]
pub struct NotifyResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// `POST /notify`
///
/// The body is parsed only after the origin and rate limit checks pass.
pub async fn notify(
    State(state): State<SharedState>,
    Extension(client): Extension<ClientInfo>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<NotifyResponse>)> {
    state.check_origin(&headers)?;

    let limits = &state.config.rate_limit;
    let decision = state
        .limiter
        .check(
            &format!("notify:{}", client.ip),
            limits.notify_limit,
            limits.notify_window_secs,
        )
        .await;
    if !decision.allowed {
        state.metrics.notify_rate_limited();
        info!(ip = %client.ip, "notify rate limited");
        return Err(ApiError::RateLimited {
            retry_after_secs: decision.retry_after(chrono::Utc::now().timestamp()),
        });
    }

    let request: NotifyRequest = parse_json(&body)?;
    let target = request
        .target()
        .ok_or(ValidationError::MissingField("path"))?;
    let path = state.paths.resolve(target)?;

    let email = state.gate_email(&headers).ok_or(ApiError::GateRequired)?;
    let title = validator::normalize_title(request.title.as_deref());

    let appended = state
        .downloads
        .append(AppendInput {
            path: Some(path.clone()),
            email: Some(email.clone()),
            title: title.clone(),
            ua: client.user_agent.clone(),
            ip: Some(client.ip.clone()),
            referer: headers
                .get(header::REFERER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            ..AppendInput::default()
        })
        .await;

    let (id, warning) = match appended {
        Ok(id) => {
            state.metrics.download_logged();
            (Some(id), None)
        }
        Err(err) => {
            warn!(error = %err, path = %path, "download not logged");
            (None, Some("download was not logged".to_string()))
        }
    };

    match (state.mailer.clone(), state.config.mail.to.clone()) {
        (Some(mailer), Some(to)) => {
            let message = mailer::download_notice(
                &state.config.mail.from,
                &to,
                &email,
                &path,
                title.as_deref(),
            );
            let metrics = state.metrics.clone();
            tokio::spawn(async move {
                if let Err(err) = mailer.send(message).await {
                    metrics.mail_failed();
                    warn!(error = %err, "download notification failed");
                }
            });
        }
        _ => debug!("download notification skipped; mail not configured"),
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(NotifyResponse {
            ok: true,
            id,
            warning,
        }),
    ))
}
