//! ClipForge - highlight clips for short-form platforms
//!
//! Entry point: configuration, logging, directory setup, and the HTTP
//! server with graceful shutdown.

mod config;

use anyhow::{Context, Result};
use clipforge_server::{build_router, AppState};
use config::Config;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&config.log_filter).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(bind = %config.bind, "ClipForge starting");

    std::fs::create_dir_all(&config.output_dir)
        .with_context(|| format!("creating output dir {}", config.output_dir.display()))?;
    std::fs::create_dir_all(&config.temp_dir)
        .with_context(|| format!("creating temp dir {}", config.temp_dir.display()))?;

    let state = AppState::new(
        config.tool_overrides.clone(),
        &config.output_dir,
        &config.temp_dir,
    );
    state.warm_up();

    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("binding {}", config.bind))?;
    info!(addr = %config.bind, "Listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("ClipForge stopped");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown signal received");
}
