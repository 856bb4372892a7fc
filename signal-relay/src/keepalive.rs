//! Background keepalive supervisor.
//!
//! Runs periodically, pings every registered connection, and evicts the
//! ones that fail to acknowledge in time. Eviction closes the transport,
//! which also wakes the connection's own read loop so it can run its
//! teardown.

use crate::config::KeepaliveConfig;
use crate::connection::Connection;
use crate::registry::Registry;
use crate::server::RelayMetrics;
use futures_util::future::join_all;
use signal_types::SessionToken;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Probe timing policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepalivePolicy {
    /// Time between probe cycles.
    pub interval: Duration,
    /// Deadline for each ping to be acknowledged.
    pub ack_timeout: Duration,
    /// Probe all connections at once rather than one after another.
    ///
    /// Sequentially, one unresponsive peer delays the probes behind it
    /// by up to `ack_timeout`.
    pub concurrent: bool,
}

impl From<&KeepaliveConfig> for KeepalivePolicy {
    fn from(config: &KeepaliveConfig) -> Self {
        Self {
            interval: config.interval(),
            ack_timeout: config.ack_timeout(),
            concurrent: config.concurrent_probes,
        }
    }
}

/// Spawn the keepalive supervisor.
///
/// The first cycle runs one full interval after start. Returns a handle
/// that can be used to abort the task.
pub fn spawn_keepalive_task(
    registry: Arc<Registry>,
    metrics: Arc<RelayMetrics>,
    policy: KeepalivePolicy,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(
            "Keepalive task started (interval: {:?}, ack timeout: {:?}, concurrent: {})",
            policy.interval,
            policy.ack_timeout,
            policy.concurrent
        );

        let mut timer = interval_at(Instant::now() + policy.interval, policy.interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            timer.tick().await;

            tracing::info!("Probing {} connections", registry.len());
            let evicted = probe_all(&registry, &metrics, &policy).await;
            if evicted > 0 {
                tracing::info!("Keepalive: evicted {} unresponsive connections", evicted);
            } else {
                tracing::debug!("Keepalive: all connections responsive");
            }
        }
    })
}

/// Run one probe cycle over a registry snapshot.
///
/// Returns the number of connections evicted. A failed probe only ever
/// affects the connection it was sent to.
pub async fn probe_all(
    registry: &Registry,
    metrics: &RelayMetrics,
    policy: &KeepalivePolicy,
) -> usize {
    let snapshot = registry.snapshot();

    if policy.concurrent {
        let probes = snapshot
            .iter()
            .map(|(token, conn)| probe_one(registry, metrics, token, conn, policy.ack_timeout));
        join_all(probes).await.into_iter().filter(|evicted| *evicted).count()
    } else {
        let mut evicted = 0;
        for (token, conn) in &snapshot {
            if probe_one(registry, metrics, token, conn, policy.ack_timeout).await {
                evicted += 1;
            }
        }
        evicted
    }
}

/// Probe one connection, evicting it on failure. Returns whether it was evicted.
async fn probe_one(
    registry: &Registry,
    metrics: &RelayMetrics,
    token: &SessionToken,
    conn: &Arc<Connection>,
    ack_timeout: Duration,
) -> bool {
    // Torn down since the snapshot was taken.
    if conn.is_closed() || !registry.is_current(token, conn) {
        return false;
    }

    match conn.probe(ack_timeout).await {
        Ok(()) => false,
        Err(e) => {
            tracing::warn!("Ping failed for {:?}: {}", token, e);
            conn.close();
            registry.release(token, conn);
            metrics.keepalive_evictions.fetch_add(1, Ordering::Relaxed);
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::testing::{broken_connection, channel_connection, responsive_connection};

    fn policy(concurrent: bool) -> KeepalivePolicy {
        KeepalivePolicy {
            interval: Duration::from_millis(100),
            ack_timeout: Duration::from_millis(50),
            concurrent,
        }
    }

    #[test]
    fn policy_from_config() {
        let config = KeepaliveConfig::default();
        let policy = KeepalivePolicy::from(&config);
        assert_eq!(policy.interval, Duration::from_secs(30));
        assert_eq!(policy.ack_timeout, Duration::from_secs(10));
        assert!(!policy.concurrent);
    }

    #[tokio::test]
    async fn responsive_connections_survive() {
        let registry = Registry::new();
        let metrics = RelayMetrics::default();
        let token = SessionToken::generate();
        registry.register(token.clone(), responsive_connection());

        let evicted = probe_all(&registry, &metrics, &policy(false)).await;

        assert_eq!(evicted, 0);
        assert!(registry.contains(&token));
    }

    #[tokio::test]
    async fn silent_connection_is_evicted_and_closed() {
        let registry = Registry::new();
        let metrics = RelayMetrics::default();
        let token = SessionToken::generate();
        let (conn, _rx) = channel_connection();
        registry.register(token.clone(), conn.clone());

        let evicted = probe_all(&registry, &metrics, &policy(false)).await;

        assert_eq!(evicted, 1);
        assert!(registry.lookup(&token).is_none());
        assert!(conn.is_closed());
        assert_eq!(metrics.keepalive_evictions.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn broken_connection_is_evicted() {
        let registry = Registry::new();
        let metrics = RelayMetrics::default();
        let token = SessionToken::generate();
        registry.register(token.clone(), broken_connection());

        assert_eq!(probe_all(&registry, &metrics, &policy(false)).await, 1);
        assert!(!registry.contains(&token));
    }

    #[tokio::test]
    async fn one_failure_does_not_stop_the_cycle() {
        for concurrent in [false, true] {
            let registry = Registry::new();
            let metrics = RelayMetrics::default();
            let dead = SessionToken::generate();
            let alive_a = SessionToken::generate();
            let alive_b = SessionToken::generate();
            registry.register(dead.clone(), broken_connection());
            registry.register(alive_a.clone(), responsive_connection());
            registry.register(alive_b.clone(), responsive_connection());

            let evicted = probe_all(&registry, &metrics, &policy(concurrent)).await;

            assert_eq!(evicted, 1);
            assert!(!registry.contains(&dead));
            assert!(registry.contains(&alive_a));
            assert!(registry.contains(&alive_b));
        }
    }

    #[tokio::test]
    async fn concurrent_probes_share_one_timeout_window() {
        let registry = Registry::new();
        let metrics = RelayMetrics::default();
        let mut receivers = Vec::new();
        for _ in 0..5 {
            let (conn, rx) = channel_connection();
            receivers.push(rx);
            registry.register(SessionToken::generate(), conn);
        }

        let started = std::time::Instant::now();
        let evicted = probe_all(&registry, &metrics, &policy(true)).await;

        assert_eq!(evicted, 5);
        assert!(registry.is_empty());
        // Five sequential timeouts would take 250ms.
        assert!(started.elapsed() < Duration::from_millis(200));
    }

    #[tokio::test]
    async fn already_closed_connection_is_skipped() {
        let registry = Registry::new();
        let metrics = RelayMetrics::default();
        let token = SessionToken::generate();
        let (conn, _rx) = channel_connection();
        registry.register(token.clone(), conn.clone());
        conn.close();

        assert_eq!(probe_all(&registry, &metrics, &policy(false)).await, 0);
        assert_eq!(metrics.keepalive_evictions.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn task_evicts_on_its_own_schedule() {
        let registry = Arc::new(Registry::new());
        let metrics = Arc::new(RelayMetrics::default());
        let token = SessionToken::generate();
        let (conn, _rx) = channel_connection();
        registry.register(token.clone(), conn);

        let handle = spawn_keepalive_task(registry.clone(), metrics.clone(), policy(false));

        // Not probed before the first interval elapses.
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(registry.contains(&token));

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!registry.contains(&token));

        handle.abort();
    }
}
