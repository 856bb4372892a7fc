//! Health check endpoint.

use crate::server::SignalRelay;
use axum::{Extension, Json};
use serde::Serialize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

/// Global start time for uptime calculation.
static START_TIME: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize the start time (call once at startup).
pub fn init_start_time() {
    START_TIME.get_or_init(Instant::now);
}

/// Health status response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    /// Overall status.
    pub status: String,
    /// Server version.
    pub version: String,
    /// Number of live relay connections.
    pub connections: usize,
    /// Path clients upgrade on.
    pub ws_path: String,
    /// Seconds between keepalive probe cycles.
    pub keepalive_interval_secs: u64,
    /// Connections evicted for missing a keepalive ack since startup.
    pub keepalive_evictions: u64,
    /// Uptime in seconds.
    pub uptime_seconds: u64,
}

/// Health check handler.
pub async fn health_handler(Extension(relay): Extension<Arc<SignalRelay>>) -> Json<HealthStatus> {
    let uptime = START_TIME
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0);

    Json(HealthStatus {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        connections: relay.total_connections(),
        ws_path: relay.config().server.ws_path.clone(),
        keepalive_interval_secs: relay.config().keepalive.interval_secs,
        keepalive_evictions: relay.metrics().keepalive_evictions.load(Ordering::Relaxed),
        uptime_seconds: uptime,
    })
}
