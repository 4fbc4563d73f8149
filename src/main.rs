// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Portfolio edge service
//!
//! Configuration is read from an optional TOML file (`--config`) and from
//! `PORTFOLIO_*` environment variables, after loading `.env` if present:
//!
//! - `PORTFOLIO_BIND_ADDR`: Server bind address (default: 0.0.0.0:8787)
//! - `PORTFOLIO_AUTH__USERNAME` / `PORTFOLIO_AUTH__PASSWORD`: demo login
//! - `PORTFOLIO_AUTH__SESSION_SECRET`: HMAC key for session tokens
//! - `PORTFOLIO_DOWNLOADS__EXPORT_USER` / `..._EXPORT_PASSWORD`: export access
//! - `PORTFOLIO_MAIL__ENDPOINT` / `..._API_KEY` / `..._TO`: notifications
//! - `PORTFOLIO_SITE__ROOT`: static site directory

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use portfolio_edge::{build_router, AppState, Config};

#[derive(Parser)]
#[command(name = "portfolio-edge", about = "Edge backend for the portfolio site")]
struct Cli {
    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the bind address
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(bind) = cli.bind {
        config.bind_addr = bind;
    }

    init_tracing(config.logging.json);

    info!(
        bind_addr = %config.bind_addr,
        api_prefix = %config.api_prefix,
        storage = %config.downloads.storage,
        notify_limit = config.rate_limit.notify_limit,
        notify_window_secs = config.rate_limit.notify_window_secs,
        site_root = ?config.site.root,
        "Starting portfolio edge"
    );

    let addr: SocketAddr = config.bind_addr.parse()?;
    let state = Arc::new(AppState::new(config).await?);

    // Sweep expired rate-limit counters
    let cleanup_state = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(cleanup_state.config.rate_limit.cleanup_interval());
        loop {
            interval.tick().await;
            let removed = cleanup_state.counters.cleanup().await;
            if removed > 0 {
                tracing::debug!(removed, "expired rate-limit counters removed");
            }
        }
    });

    let app = build_router(state);

    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "Server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server stopped");
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
