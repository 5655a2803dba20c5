//! # gatehouse-api — Binary Entry Point
//!
//! Loads `.env` (process variables win), initializes tracing, validates
//! settings, seeds the first superuser, and serves until Ctrl-C or
//! SIGTERM.

use std::net::SocketAddr;

use anyhow::Context;
use gatehouse_api::state::AppState;
use gatehouse_core::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let dotenv = dotenvy::dotenv();
    init_tracing();
    if let Ok(path) = &dotenv {
        tracing::info!(path = %path.display(), "loaded environment file");
    }

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            for problem in e.problems() {
                tracing::error!(field = problem.field, reason = %problem.reason, "invalid configuration");
            }
            return Err(e).context("refusing to start with invalid configuration");
        }
    };

    let addr = settings.server.addr;
    let environment = settings.environment;
    let seed = settings.first_superuser.clone();

    let state = AppState::new(settings).context("failed to initialise credential hasher")?;

    if let Some(seed) = seed {
        let created = state
            .gate
            .ensure_superuser(&seed)
            .await
            .context("failed to seed first superuser")?;
        if created {
            tracing::info!(identifier = %seed.identifier, "first superuser created");
        }
    }

    let app = gatehouse_api::app(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, %environment, "gatehouse listening");

    // The login rate limiter keys on the peer address from `ConnectInfo`.
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("shut down");
    Ok(())
}

/// `RUST_LOG` filter (default `info`); `LOG_FORMAT=json` for JSON lines.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
