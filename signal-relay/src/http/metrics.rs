//! Prometheus metrics endpoint.

use crate::server::SignalRelay;
use axum::{http::header::CONTENT_TYPE, response::IntoResponse, Extension};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Prometheus metrics handler.
///
/// Returns metrics in Prometheus text format.
/// Includes both gauges (current state) and counters (monotonic since startup).
pub async fn metrics_handler(Extension(relay): Extension<Arc<SignalRelay>>) -> impl IntoResponse {
    (
        [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        render(&relay),
    )
}

fn render(relay: &SignalRelay) -> String {
    let m = relay.metrics();

    // Gauges
    let connections = relay.total_connections();

    // Counters (monotonic since startup)
    let conns_total = m.connections_total.load(Ordering::Relaxed);
    let rejected = m.upgrades_rejected.load(Ordering::Relaxed);
    let received = m.messages_received.load(Ordering::Relaxed);
    let forwarded = m.messages_forwarded.load(Ordering::Relaxed);
    let misses = m.route_misses.load(Ordering::Relaxed);
    let failures = m.forward_failures.load(Ordering::Relaxed);
    let ignored = m.ignored_commands.load(Ordering::Relaxed);
    let malformed = m.malformed_messages.load(Ordering::Relaxed);
    let evictions = m.keepalive_evictions.load(Ordering::Relaxed);

    format!(
        r#"# HELP signal_relay_connections_active Number of live relay connections
# TYPE signal_relay_connections_active gauge
signal_relay_connections_active {connections}

# HELP signal_relay_info Server information
# TYPE signal_relay_info gauge
signal_relay_info{{version="{version}"}} 1

# HELP signal_relay_connections_total Total connections registered
# TYPE signal_relay_connections_total counter
signal_relay_connections_total {conns_total}

# HELP signal_relay_upgrades_rejected_total Total upgrades refused by origin policy
# TYPE signal_relay_upgrades_rejected_total counter
signal_relay_upgrades_rejected_total {rejected}

# HELP signal_relay_messages_received_total Total signaling messages decoded
# TYPE signal_relay_messages_received_total counter
signal_relay_messages_received_total {received}

# HELP signal_relay_messages_forwarded_total Total messages delivered to a peer
# TYPE signal_relay_messages_forwarded_total counter
signal_relay_messages_forwarded_total {forwarded}

# HELP signal_relay_route_misses_total Total messages addressed to an unknown token
# TYPE signal_relay_route_misses_total counter
signal_relay_route_misses_total {misses}

# HELP signal_relay_forward_failures_total Total messages whose destination write failed
# TYPE signal_relay_forward_failures_total counter
signal_relay_forward_failures_total {failures}

# HELP signal_relay_ignored_commands_total Total messages dropped for an unrouted command
# TYPE signal_relay_ignored_commands_total counter
signal_relay_ignored_commands_total {ignored}

# HELP signal_relay_malformed_messages_total Total inbound frames that failed to decode
# TYPE signal_relay_malformed_messages_total counter
signal_relay_malformed_messages_total {malformed}

# HELP signal_relay_keepalive_evictions_total Total connections evicted by keepalive
# TYPE signal_relay_keepalive_evictions_total counter
signal_relay_keepalive_evictions_total {evictions}
"#,
        version = env!("CARGO_PKG_VERSION"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn exposition_reflects_counters() {
        let relay = SignalRelay::new(Config::default());
        relay
            .metrics()
            .route_misses
            .fetch_add(3, Ordering::Relaxed);

        let body = render(&relay);
        assert!(body.contains("signal_relay_connections_active 0"));
        assert!(body.contains("signal_relay_route_misses_total 3"));
        assert!(body.contains("# TYPE signal_relay_keepalive_evictions_total counter"));
    }
}
