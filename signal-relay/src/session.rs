//! Per-connection lifecycle management.
//!
//! Each upgraded socket gets a Session: it allocates the token, registers
//! the connection, sends the handshake, then reads one frame at a time and
//! hands decoded messages to the router. Whatever ends the read loop,
//! teardown runs exactly once.

use crate::connection::Connection;
use crate::server::SignalRelay;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{FutureExt, Stream, StreamExt};
use signal_types::{SessionToken, SignalingMessage};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// WebSocket close codes the relay distinguishes.
pub mod close_code {
    /// Normal closure.
    pub const NORMAL: u16 = 1000;
    /// Endpoint going away (tab closed, page navigated).
    pub const GOING_AWAY: u16 = 1001;
    /// Frame carried no status code.
    pub const NO_STATUS: u16 = 1005;
    /// Connection dropped without a close frame.
    pub const ABNORMAL: u16 = 1006;
}

/// Session state machine states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Registered and reading.
    Open,
    /// Read loop has ended; teardown in progress.
    Closing,
    /// Removed from the registry and transport released.
    Closed,
}

/// Why a connection left the `Open` state.
///
/// Only affects log severity; every reason goes through the same teardown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Peer sent a normal close.
    Normal,
    /// Peer is going away.
    GoingAway,
    /// Stream ended without a close frame.
    Abnormal,
    /// Peer closed with any other code.
    Unexpected(u16),
    /// Reading from the transport failed.
    Transport(String),
    /// An inbound frame did not decode as a signaling message.
    Malformed(String),
    /// The connection was closed from outside the read loop (keepalive
    /// eviction, or its writer failed).
    Evicted,
    /// The handshake message could not be written.
    HandshakeFailed(String),
    /// Message handling panicked.
    Panicked,
}

impl CloseReason {
    /// Classify a received close frame.
    pub fn from_close_frame(frame: Option<&CloseFrame<'_>>) -> Self {
        match frame.map(|f| f.code) {
            None | Some(close_code::NORMAL) | Some(close_code::NO_STATUS) => CloseReason::Normal,
            Some(close_code::GOING_AWAY) => CloseReason::GoingAway,
            Some(close_code::ABNORMAL) => CloseReason::Abnormal,
            Some(code) => CloseReason::Unexpected(code),
        }
    }

    /// Ordinary client churn, not worth more than a debug line.
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            CloseReason::Normal
                | CloseReason::GoingAway
                | CloseReason::Abnormal
                | CloseReason::Transport(_)
                | CloseReason::Evicted
        )
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::Normal => write!(f, "normal closure"),
            CloseReason::GoingAway => write!(f, "going away"),
            CloseReason::Abnormal => write!(f, "abnormal closure"),
            CloseReason::Unexpected(code) => write!(f, "unexpected close code {}", code),
            CloseReason::Transport(e) => write!(f, "read error: {}", e),
            CloseReason::Malformed(e) => write!(f, "malformed message: {}", e),
            CloseReason::Evicted => write!(f, "closed by relay"),
            CloseReason::HandshakeFailed(e) => write!(f, "handshake failed: {}", e),
            CloseReason::Panicked => write!(f, "handler panicked"),
        }
    }
}

/// A per-connection session.
pub struct Session {
    relay: Arc<SignalRelay>,
    token: SessionToken,
    connection: Arc<Connection>,
    state: SessionState,
}

impl Session {
    /// Allocate a fresh token and register `connection` under it.
    pub fn open(relay: Arc<SignalRelay>, connection: Arc<Connection>) -> Self {
        let token = loop {
            let candidate = SessionToken::generate();
            if relay
                .registry()
                .try_register(candidate.clone(), connection.clone())
            {
                break candidate;
            }
            tracing::error!("Generated token {:?} is already live, retrying", candidate);
        };

        relay.metrics().connections_total.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            "Connection opened: {:?} (total: {})",
            token,
            relay.total_connections()
        );

        Self {
            relay,
            token,
            connection,
            state: SessionState::Open,
        }
    }

    /// The token this session is registered under.
    pub fn token(&self) -> &SessionToken {
        &self.token
    }

    /// The connection this session owns.
    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// Current lifecycle state.
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Run the session until completion, then tear it down.
    pub async fn run<R>(mut self, mut inbound: R) -> CloseReason
    where
        R: Stream<Item = Result<Message, axum::Error>> + Unpin,
    {
        let reason = AssertUnwindSafe(self.read_loop(&mut inbound))
            .catch_unwind()
            .await
            .unwrap_or(CloseReason::Panicked);

        self.state = SessionState::Closing;
        log_close(&self.token, &reason);
        self.teardown().await;
        reason
    }

    async fn read_loop<R>(&self, inbound: &mut R) -> CloseReason
    where
        R: Stream<Item = Result<Message, axum::Error>> + Unpin,
    {
        let handshake = SignalingMessage::handshake(&self.token);
        if let Err(e) = self.connection.send_message(&handshake) {
            return CloseReason::HandshakeFailed(e.to_string());
        }

        loop {
            let frame = tokio::select! {
                _ = self.connection.closed() => return CloseReason::Evicted,
                frame = inbound.next() => frame,
            };

            let decoded = match frame {
                None => return CloseReason::Abnormal,
                Some(Err(e)) => return CloseReason::Transport(e.to_string()),
                Some(Ok(Message::Close(frame))) => {
                    return CloseReason::from_close_frame(frame.as_ref())
                }
                Some(Ok(Message::Pong(_))) => {
                    self.connection.record_pong();
                    continue;
                }
                // Answered by the transport.
                Some(Ok(Message::Ping(_))) => continue,
                Some(Ok(Message::Text(text))) => SignalingMessage::from_json(&text),
                Some(Ok(Message::Binary(bytes))) => SignalingMessage::from_json_slice(&bytes),
            };

            match decoded {
                Ok(message) => {
                    self.relay
                        .metrics()
                        .messages_received
                        .fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(
                        "Received {:?} from {:?} for {:?}",
                        message.command,
                        self.token,
                        message.to
                    );
                    self.relay.router().route(&self.token, message);
                }
                Err(e) => {
                    self.relay
                        .metrics()
                        .malformed_messages
                        .fetch_add(1, Ordering::Relaxed);
                    return CloseReason::Malformed(e.to_string());
                }
            }
        }
    }

    async fn teardown(&mut self) {
        self.relay.registry().release(&self.token, &self.connection);
        self.connection.close();
        self.state = SessionState::Closed;
        tracing::info!(
            "Connection closed: {:?} (remaining: {})",
            self.token,
            self.relay.total_connections()
        );
    }
}

fn log_close(token: &SessionToken, reason: &CloseReason) {
    match reason {
        r if r.is_expected() => tracing::debug!("Connection {:?} ending: {}", token, r),
        CloseReason::Malformed(_) | CloseReason::HandshakeFailed(_) => {
            tracing::warn!("Connection {:?} ending: {}", token, reason)
        }
        _ => tracing::error!("Connection {:?} ending: {}", token, reason),
    }
}

/// Drive one upgraded socket from registration to teardown.
pub async fn handle_socket(relay: Arc<SignalRelay>, socket: WebSocket) {
    let (sink, stream) = socket.split();
    let session = Session::open(relay, Arc::new(Connection::new(sink)));
    session.run(stream).await;
}
