//! Message routing between connected peers.
//!
//! The router is the only place a message crosses from one connection to
//! another. It overwrites `from` with the sender's real token, forwards
//! `answer` and `icecandidate` to the addressed peer, and drops
//! everything else. Nothing it does is ever reported back to the sender.

use crate::registry::Registry;
use crate::server::RelayMetrics;
use signal_types::{SessionToken, SignalingMessage};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// What happened to one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Written to the destination connection.
    Forwarded,
    /// No connection is registered under `to`.
    RouteMiss,
    /// The destination was found but could not take the message.
    ForwardFailed,
    /// The command is not one the relay forwards.
    Ignored,
}

/// Forwards signaling messages through the registry.
#[derive(Debug, Clone)]
pub struct MessageRouter {
    registry: Arc<Registry>,
    metrics: Arc<RelayMetrics>,
}

impl MessageRouter {
    /// Create a router over `registry`.
    pub fn new(registry: Arc<Registry>, metrics: Arc<RelayMetrics>) -> Self {
        Self { registry, metrics }
    }

    /// Route one decoded message sent by `sender`.
    ///
    /// Runs inline on the sender's read loop, so a sender's messages reach
    /// their destination in the order they were read. Never waits on the
    /// destination: a peer that stops draining its socket costs the sender
    /// dropped messages, not a stalled read loop.
    pub fn route(&self, sender: &SessionToken, mut message: SignalingMessage) -> RouteOutcome {
        message.from = sender.clone();

        let command = message.command_kind();
        if !command.is_routable() {
            tracing::warn!(
                "Dropping message with unsupported command {:?} from {:?}",
                command.as_str(),
                sender
            );
            self.metrics.ignored_commands.fetch_add(1, Ordering::Relaxed);
            return RouteOutcome::Ignored;
        }

        let Some(destination) = self.registry.lookup(&message.to) else {
            tracing::warn!(
                "Dropping {} from {:?}: destination {:?} is not connected",
                command.as_str(),
                sender,
                message.to
            );
            self.metrics.route_misses.fetch_add(1, Ordering::Relaxed);
            return RouteOutcome::RouteMiss;
        };

        match destination.send_message(&message) {
            Ok(()) => {
                tracing::debug!(
                    "Forwarded {} from {:?} to {:?} ({} bytes)",
                    command.as_str(),
                    sender,
                    message.to,
                    message.data.len()
                );
                self.metrics.messages_forwarded.fetch_add(1, Ordering::Relaxed);
                RouteOutcome::Forwarded
            }
            Err(e) => {
                // The destination's own read loop or the next keepalive
                // probe is responsible for closing it.
                tracing::warn!(
                    "Failed to forward {} from {:?} to {:?}: {}",
                    command.as_str(),
                    sender,
                    message.to,
                    e
                );
                self.metrics.forward_failures.fetch_add(1, Ordering::Relaxed);
                RouteOutcome::ForwardFailed
            }
        }
    }
}
