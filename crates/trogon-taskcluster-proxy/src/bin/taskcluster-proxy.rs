//! Taskcluster proxy binary.
//!
//! Listens on `PROXY_PORT` (default 8080) and signs every forwarded request
//! with the configured credentials. See [`trogon_taskcluster_proxy::config`]
//! for every flag and environment variable; `RUST_LOG` sets the log filter
//! (default `info`).

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use trogon_hawk::{Delegator, HmacSha256, ScopeSet};
use trogon_taskcluster_proxy::clock::{SystemClock, WallClock};
use trogon_taskcluster_proxy::config;
use trogon_taskcluster_proxy::env::SystemEnv;
use trogon_taskcluster_proxy::proxy::{self, ProxyState};
use trogon_taskcluster_proxy::task_scopes;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut config = config::from_env_with_provider(&SystemEnv)?;
    let http_client = proxy::http_client(&config).context("Failed to build HTTP client")?;
    let clock: Arc<dyn WallClock> = Arc::new(SystemClock);

    if let Some(task_id) = config.task_id().map(str::to_owned) {
        // Unrestricted: the lookup runs with everything the credentials hold.
        let lookup = Delegator::new(config.credentials().clone(), ScopeSet::empty(), HmacSha256);
        let task_scopes = task_scopes::fetch(
            &http_client,
            config.services(),
            &lookup,
            clock.as_ref(),
            &task_id,
        )
        .await
        .with_context(|| format!("Failed to load scopes of task {task_id}"))?;
        let scopes = config.scopes().union(&task_scopes);
        config = config.with_scopes(scopes);
    }

    if config.scopes().is_empty() {
        warn!("No scopes given, requests are signed with every scope the credentials hold");
    }

    info!(
        client_id = config.credentials().client_id(),
        temporary = config.credentials().is_temporary(),
        scopes = ?config.scopes(),
        services = config.services().len(),
        "Taskcluster proxy starting"
    );

    let delegator = Delegator::new(config.credentials().clone(), config.scopes().clone(), HmacSha256);
    let state = ProxyState::new(&config, delegator, http_client, clock);
    let app = proxy::router(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port()))
        .await
        .with_context(|| format!("Failed to bind port {}", config.port()))?;

    info!(port = config.port(), "Listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Taskcluster proxy stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            warn!(error = %error, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
            return;
        }
        info!("Received SIGINT (Ctrl+C)");
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
                info!("Received SIGTERM");
            }
            Err(error) => {
                warn!(error = %error, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
