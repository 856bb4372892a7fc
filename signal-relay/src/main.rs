//! signal-relay binary entry point.
//!
//! Usage:
//! ```bash
//! signal-relay --config relay.toml
//! RUST_LOG=debug signal-relay
//! ```

use signal_relay::config::Config;
use signal_relay::error::{RelayError, Result};
use signal_relay::http::{self, health};
use signal_relay::server::SignalRelay;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = load_config(&get_config_path())?;
    run(config).await?;
    Ok(())
}

async fn run(config: Config) -> Result<()> {
    let relay = Arc::new(SignalRelay::new(config));
    health::init_start_time();

    let bind_address = relay.config().server.bind_address.clone();
    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .map_err(|source| RelayError::Bind {
            address: bind_address.clone(),
            source,
        })?;

    let keepalive = relay.spawn_keepalive();
    let app = http::build_router(relay.clone());

    tracing::info!(
        "signal-relay v{} listening on {} (ws path: {})",
        env!("CARGO_PKG_VERSION"),
        bind_address,
        relay.config().server.ws_path
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    keepalive.abort();
    tracing::info!("Server shutdown successfully");
    Ok(())
}

fn get_config_path() -> PathBuf {
    std::env::args()
        .skip_while(|arg| arg != "--config")
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("relay.toml"))
}

fn load_config(path: &Path) -> Result<Config> {
    let mut config = if path.exists() {
        tracing::info!("Loading configuration from {}", path.display());
        Config::from_file(path)?
    } else {
        tracing::warn!("Config file {} not found, using defaults", path.display());
        Config::default()
    };
    config.apply_env();
    config.validate()?;

    if config.server.allowed_origins.is_empty() {
        tracing::warn!("No allowed origins configured: every upgrade will be rejected");
    }
    Ok(config)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
