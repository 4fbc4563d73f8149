// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Static site serving with the download gate enforced at the edge.

use crate::error::ApiError;
use crate::handlers::AppState;
use axum::{
    extract::Request,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use tower::ServiceExt;
use tower_http::services::ServeDir;
use tracing::info;

const GATE_PAGE: &str = r#"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Email required</title>
</head>
<body>
<main>
<h1>Please enter your email first</h1>
<p>This file is available once you have shared an email address on the site.</p>
<p>Go back to the page you came from, click the download link again and enter your email when asked.</p>
<p><a href="/">Return to the site</a></p>
</main>
</body>
</html>
"#;

/// Whether `path` falls under one of the gated prefixes.
///
/// Compared after percent-decoding and collapsing repeated slashes, the same
/// way the file server resolves it.
pub fn is_protected(path: &str, prefixes: &[String]) -> bool {
    let decoded = urlencoding::decode(path)
        .map(|p| p.into_owned())
        .unwrap_or_else(|_| path.to_string());
    let mut normalized = String::with_capacity(decoded.len());
    for c in decoded.chars() {
        if !(c == '/' && normalized.ends_with('/')) {
            normalized.push(c);
        }
    }

    prefixes
        .iter()
        .filter(|p| !p.is_empty())
        .any(|prefix| normalized.starts_with(prefix.as_str()))
}

/// The page shown instead of a gated file.
pub fn gate_page() -> Response {
    (StatusCode::FORBIDDEN, Html(GATE_PAGE)).into_response()
}

/// Serve a non-API request from the configured site root.
pub async fn serve(state: &AppState, request: Request) -> Response {
    let Some(root) = state.config.site.root.as_ref() else {
        return ApiError::NotFound.into_response();
    };

    let path = request.uri().path();
    if is_protected(path, &state.config.gate.protected_prefixes)
        && state.gate_email(request.headers()).is_none()
    {
        info!(path = %path, "gated download without email");
        return gate_page();
    }

    match ServeDir::new(root).oneshot(request).await {
        Ok(response) => response.into_response(),
        Err(never) => match never {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_protected() {
        let prefixes = vec!["/assets/downloads/".to_string(), String::new()];
        assert!(is_protected("/assets/downloads/cv.pdf", &prefixes));
        assert!(!is_protected("/assets/img/me.png", &prefixes));
        assert!(!is_protected("/", &prefixes));
        assert!(is_protected("/assets//downloads/cv.pdf", &prefixes));
        assert!(is_protected("/assets/%64ownloads/cv.pdf", &prefixes));
    }

    #[test]
    fn test_gate_page_is_forbidden_html() {
        let response = gate_page();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(response.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("text/html"));
    }
}
