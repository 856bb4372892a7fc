//! Main SignalRelay composition root.
//!
//! SignalRelay owns the registry and hands it by reference to the router,
//! the per-connection sessions, and the keepalive supervisor.

use crate::config::Config;
use crate::keepalive::{self, KeepalivePolicy};
use crate::origin::OriginPolicy;
use crate::registry::Registry;
use crate::router::MessageRouter;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

/// Operational metrics for monitoring relay activity.
///
/// All counters are monotonically increasing (reset only on restart).
/// Counters are `AtomicU64`; incrementing takes no lock.
#[derive(Debug, Default)]
pub struct RelayMetrics {
    /// Total connections upgraded and registered.
    pub connections_total: AtomicU64,
    /// Total upgrade requests refused by the origin policy.
    pub upgrades_rejected: AtomicU64,
    /// Total signaling messages decoded from clients.
    pub messages_received: AtomicU64,
    /// Total messages written to their destination.
    pub messages_forwarded: AtomicU64,
    /// Total messages addressed to a token that is not connected.
    pub route_misses: AtomicU64,
    /// Total messages whose destination write failed.
    pub forward_failures: AtomicU64,
    /// Total messages dropped for carrying an unrouted command.
    pub ignored_commands: AtomicU64,
    /// Total inbound frames that failed to decode.
    pub malformed_messages: AtomicU64,
    /// Total connections evicted by the keepalive supervisor.
    pub keepalive_evictions: AtomicU64,
}

/// Main relay server.
pub struct SignalRelay {
    config: Config,
    registry: Arc<Registry>,
    router: MessageRouter,
    origins: OriginPolicy,
    metrics: Arc<RelayMetrics>,
}

impl std::fmt::Debug for SignalRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalRelay")
            .field("config", &self.config)
            .field("origins", &self.origins)
            .field("metrics", &self.metrics)
            .field("connections", &self.registry.len())
            .finish_non_exhaustive()
    }
}

impl SignalRelay {
    /// Create a relay with a fresh, empty registry.
    pub fn new(config: Config) -> Self {
        let registry = Arc::new(Registry::new());
        let metrics = Arc::new(RelayMetrics::default());
        let router = MessageRouter::new(registry.clone(), metrics.clone());
        let origins = OriginPolicy::new(&config.server.allowed_origins);
        Self {
            config,
            registry,
            router,
            origins,
            metrics,
        }
    }

    /// Get the relay configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the connection registry.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Get the message router.
    pub fn router(&self) -> &MessageRouter {
        &self.router
    }

    /// Get the origin policy guarding upgrades.
    pub fn origins(&self) -> &OriginPolicy {
        &self.origins
    }

    /// Get access to the operational metrics.
    pub fn metrics(&self) -> &Arc<RelayMetrics> {
        &self.metrics
    }

    /// Number of live connections.
    pub fn total_connections(&self) -> usize {
        self.registry.len()
    }

    /// Start the keepalive supervisor for this relay's registry.
    pub fn spawn_keepalive(&self) -> tokio::task::JoinHandle<()> {
        keepalive::spawn_keepalive_task(
            self.registry.clone(),
            self.metrics.clone(),
            KeepalivePolicy::from(&self.config.keepalive),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::testing::channel_connection;
    use signal_types::SessionToken;

    #[test]
    fn new_relay_is_empty() {
        let relay = SignalRelay::new(Config::default());
        assert_eq!(relay.total_connections(), 0);
        assert!(relay.registry().is_empty());
    }

    #[tokio::test]
    async fn relays_do_not_share_registries() {
        let first = SignalRelay::new(Config::default());
        let second = SignalRelay::new(Config::default());

        let (conn, _rx) = channel_connection();
        first.registry().register(SessionToken::generate(), conn);

        assert_eq!(first.total_connections(), 1);
        assert_eq!(second.total_connections(), 0);
    }

    #[test]
    fn origin_policy_follows_config() {
        let mut config = Config::default();
        config.server.allowed_origins = vec!["https://app.example.com".to_string()];
        let relay = SignalRelay::new(config);

        assert!(relay.origins().allows("https://app.example.com"));
        assert!(!relay.origins().allows("https://other.example.com"));
    }
}
