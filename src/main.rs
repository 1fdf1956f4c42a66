mod api;
mod config;
mod jira;
mod models;
mod runner;
mod state;
mod ui;

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;
use crate::jira::JiraClient;
use crate::runner::{Generator, JobRunner};
use crate::state::{AppState, ConnectionStore, JobStore};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = AppConfig::load()?;
    info!(
        "config: {} (jira timeout {}s)",
        config.config_path.display(),
        config.jira_timeout_seconds
    );

    let generator = Generator::from_config(&config);
    info!("test generator: {}", generator.describe());

    let jobs = Arc::new(JobStore::new());
    let state = Arc::new(AppState {
        jobs: jobs.clone(),
        connections: Arc::new(ConnectionStore::new()),
        jira: JiraClient::new(config.jira_timeout()).context("failed building jira client")?,
        runner: JobRunner::new(jobs, generator),
    });
    let app = build_app(state, &config.frontend_dist());

    let addr: SocketAddr = config
        .bind_addr
        .parse()
        .with_context(|| format!("bind_addr {:?} is not a socket address", config.bind_addr))?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("testgen-rs listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server exited with an error")
}

fn build_app(state: Arc<AppState>, frontend_dist: &Path) -> Router {
    let router = api::router(state);
    let router = if frontend_dist.is_dir() {
        info!("frontend bundle: {}", frontend_dist.display());
        router.nest_service("/assets", ServeDir::new(frontend_dist))
    } else {
        warn!(
            "no frontend bundle at {}; pages will load without scripts",
            frontend_dist.display()
        );
        router
    };
    router.layer(TraceLayer::new_for_http())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[cfg(unix)]
async fn terminate_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(err) => {
            warn!("SIGTERM handler unavailable: {err}");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate_signal() {
    std::future::pending::<()>().await;
}

async fn interrupt_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("ctrl-c handler unavailable: {err}");
        std::future::pending::<()>().await;
    }
}

async fn shutdown_signal() {
    tokio::select! {
        () = interrupt_signal() => {}
        () = terminate_signal() => {}
    }
    info!("shutting down");
}
