// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Route table and middleware stack.
//!
//! Layers, outermost first: request context, CORS, panic catcher, trace.

use crate::error::ApiError;
use crate::handlers::{auth, email, health, notify, SharedState};
use crate::log_store::handlers as downloads;
use crate::middleware;
use crate::site;
use axum::{
    extract::{Request, State},
    http::header,
    middleware::from_fn_with_state,
    response::{IntoResponse, Response},
    routing::{get, post, MethodRouter},
    Router,
};
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

/// Build the application router.
pub fn build_router(state: SharedState) -> Router {
    let api = state.config.api_prefix.clone();
    let mount = state.config.downloads.mount.clone();

    let mut router = Router::new()
        .route(&format!("{api}/health"), endpoint(get(health::health), "GET"))
        .route(&format!("{api}/auth/login"), endpoint(post(auth::login), "POST"))
        .route(&format!("{api}/login"), endpoint(post(auth::login), "POST"))
        .route(&format!("{api}/auth/me"), endpoint(get(auth::me), "GET"))
        .route(&format!("{api}/me"), endpoint(get(auth::me), "GET"))
        .route(&format!("{api}/auth/logout"), endpoint(post(auth::logout), "POST"))
        .route(&format!("{api}/logout"), endpoint(post(auth::logout), "POST"))
        .route(
            &format!("{api}/email"),
            endpoint(get(email::current).post(email::set), "GET, POST"),
        )
        .route(&format!("{api}/email/clear"), endpoint(post(email::clear), "POST"))
        .route(&format!("{api}/notify"), endpoint(post(notify::notify), "POST"))
        .route(&format!("{mount}/append"), endpoint(post(downloads::append), "POST"))
        .route(
            &format!("{mount}/export.json"),
            endpoint(get(downloads::export_json), "GET"),
        )
        .route(
            &format!("{mount}/export.csv"),
            endpoint(get(downloads::export_csv), "GET"),
        );

    if state.config.metrics.enabled {
        router = router.route(
            &state.config.metrics.path,
            endpoint(get(metrics), "GET"),
        );
    }

    router
        .fallback(fallback)
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(middleware::panic_response))
        .layer(from_fn_with_state(state.clone(), middleware::cors))
        .layer(from_fn_with_state(state.clone(), middleware::request_context))
        .with_state(state)
}

/// Known path, unknown method: 405 with `Allow`.
fn endpoint(route: MethodRouter<SharedState>, allow: &'static str) -> MethodRouter<SharedState> {
    route.fallback(move || async move { ApiError::MethodNotAllowed { allow } })
}

async fn metrics(State(state): State<SharedState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

fn is_under(path: &str, prefix: &str) -> bool {
    path == prefix
        || path
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// API paths 404 with the envelope; everything else goes to the static site.
async fn fallback(State(state): State<SharedState>, request: Request) -> Response {
    let path = request.uri().path();
    if is_under(path, &state.config.api_prefix) || is_under(path, &state.config.downloads.mount) {
        return ApiError::NotFound.into_response();
    }
    site::serve(&state, request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_under() {
        assert!(is_under("/api", "/api"));
        assert!(is_under("/api/nope", "/api"));
        assert!(!is_under("/apiary", "/api"));
        assert!(!is_under("/", "/api"));
    }
}
