//! HTTP endpoints for signal-relay.
//!
//! Provides the WebSocket upgrade endpoint, health checks, and metrics.

pub mod health;
mod metrics;

use crate::error::UpgradeRejected;
use crate::server::SignalRelay;
use crate::session;
use axum::extract::WebSocketUpgrade;
use axum::http::HeaderMap;
use axum::response::Response;
use axum::{routing::get, Extension, Router};
use std::sync::atomic::Ordering;
use std::sync::Arc;

pub use health::HealthStatus;

/// Build the HTTP router with all endpoints.
pub fn build_router(relay: Arc<SignalRelay>) -> Router {
    let ws_path = relay.config().server.ws_path.clone();
    let mut router = Router::new()
        .route(&ws_path, get(ws_handler))
        .route("/health", get(health::health_handler));

    if relay.config().http.metrics_enabled {
        router = router.route("/metrics", get(metrics::metrics_handler));
    }

    router.layer(Extension(relay))
}

/// Upgrade handler for relay connections.
///
/// The origin check runs before the upgrade, so a rejected request never
/// touches the registry.
async fn ws_handler(
    Extension(relay): Extension<Arc<SignalRelay>>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, UpgradeRejected> {
    if let Err(rejected) = relay.origins().check(&headers) {
        tracing::info!("Rejected upgrade: {}", rejected);
        relay
            .metrics()
            .upgrades_rejected
            .fetch_add(1, Ordering::Relaxed);
        return Err(rejected);
    }

    Ok(ws.on_upgrade(move |socket| session::handle_socket(relay, socket)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::util::ServiceExt;

    fn test_relay(config: Config) -> Arc<SignalRelay> {
        Arc::new(SignalRelay::new(config))
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let app = build_router(test_relay(Config::default()));

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn metrics_endpoint_returns_ok() {
        let app = build_router(test_relay(Config::default()));

        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn metrics_endpoint_can_be_disabled() {
        let mut config = Config::default();
        config.http.metrics_enabled = false;
        let app = build_router(test_relay(config));

        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn plain_get_on_ws_path_is_not_upgraded() {
        let relay = test_relay(Config::default());
        let app = build_router(relay.clone());

        let response = app
            .oneshot(Request::builder().uri("/ws").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert!(response.status().is_client_error());
        assert!(relay.registry().is_empty());
    }
}
