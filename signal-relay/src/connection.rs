//! Connection handle over one WebSocket transport.
//!
//! A [`Connection`] owns the write half of a socket through a dedicated
//! writer task. Three independent callers produce frames for it (the
//! handshake, forwarded messages from other sessions, and keepalive
//! pings); they all go through one bounded outbound queue, so frames never
//! interleave on the wire and no caller ever waits on a peer's socket to
//! enqueue a message.
//!
//! The read half stays with the session's read loop. Closing the handle
//! stops the writer and wakes that loop through [`Connection::closed`],
//! which is how eviction cancels a connection whose read is still blocked.

use crate::error::{ConnectionError, ConnectionResult};
use axum::extract::ws::Message;
use futures_util::{Sink, SinkExt};
use signal_types::SignalingMessage;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, Notify};

/// Upper bound on the graceful close handshake.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Frames a connection may have queued before forwards to it are dropped.
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 64;

/// Boxed write half of a framed transport.
pub type FrameSink = Pin<Box<dyn Sink<Message, Error = axum::Error> + Send>>;

/// Ownership handle over one bidirectional framed transport.
pub struct Connection {
    outbound: mpsc::Sender<Message>,
    /// Woken when the read loop sees a Pong.
    pong: Notify,
    /// Flips to `true` once, on close or when the writer fails.
    closed: Arc<watch::Sender<bool>>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("closed", &self.is_closed())
            .field("queued", &(self.outbound.max_capacity() - self.outbound.capacity()))
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Wrap the write half of a transport with the default queue size.
    ///
    /// Spawns the writer task, so this must run inside a Tokio runtime.
    pub fn new<S>(sink: S) -> Self
    where
        S: Sink<Message, Error = axum::Error> + Send + 'static,
    {
        Self::with_capacity(sink, DEFAULT_OUTBOUND_CAPACITY)
    }

    /// Wrap the write half of a transport, queueing at most `capacity` frames.
    pub fn with_capacity<S>(sink: S, capacity: usize) -> Self
    where
        S: Sink<Message, Error = axum::Error> + Send + 'static,
    {
        let (outbound, queued) = mpsc::channel(capacity.max(1));
        let (closed, _) = watch::channel(false);
        let closed = Arc::new(closed);
        tokio::spawn(write_frames(Box::pin(sink), queued, closed.clone()));

        Self {
            outbound,
            pong: Notify::new(),
            closed,
        }
    }

    /// Queue one signaling message as a JSON text frame.
    ///
    /// Never waits: a full queue is reported as [`ConnectionError::QueueFull`]
    /// and the message is dropped.
    pub fn send_message(&self, message: &SignalingMessage) -> ConnectionResult<()> {
        if self.is_closed() {
            return Err(ConnectionError::Closed);
        }
        let text = message.to_json()?;
        self.outbound
            .try_send(Message::Text(text))
            .map_err(|e| match e {
                TrySendError::Full(_) => ConnectionError::QueueFull,
                TrySendError::Closed(_) => ConnectionError::Closed,
            })
    }

    /// Send a ping and wait for its pong, all within `ack_timeout`.
    ///
    /// Any pong arriving after the ping is queued counts as the
    /// acknowledgment; pongs seen before this call do not. A ping stuck
    /// behind a backed-up queue counts against the same deadline.
    pub async fn probe(&self, ack_timeout: Duration) -> ConnectionResult<()> {
        if self.is_closed() {
            return Err(ConnectionError::Closed);
        }
        let acked = self.pong.notified();
        tokio::pin!(acked);
        acked.as_mut().enable();

        let exchange = async {
            self.outbound
                .send(Message::Ping(Vec::new()))
                .await
                .map_err(|_| ConnectionError::Closed)?;
            tokio::select! {
                _ = acked.as_mut() => Ok(()),
                _ = self.closed() => Err(ConnectionError::Closed),
            }
        };

        match tokio::time::timeout(ack_timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(ConnectionError::AckTimeout {
                timeout_ms: ack_timeout.as_millis(),
            }),
        }
    }

    /// Record that the peer answered a ping.
    pub fn record_pong(&self) {
        self.pong.notify_waiters();
    }

    /// Close the transport. Only the first call has any effect.
    ///
    /// Takes effect immediately: the owning read loop is woken and the
    /// writer abandons whatever it was writing, then attempts a graceful
    /// close bounded by a short grace period.
    pub fn close(&self) {
        self.closed.send_replace(true);
    }

    /// Resolves once the connection is closed.
    pub async fn closed(&self) {
        let mut watcher = self.closed.subscribe();
        wait_closed(&mut watcher).await;
    }

    /// Whether the connection is closed.
    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}

async fn wait_closed(watcher: &mut watch::Receiver<bool>) {
    loop {
        if *watcher.borrow_and_update() {
            return;
        }
        if watcher.changed().await.is_err() {
            return;
        }
    }
}

/// Drain the outbound queue into the socket until closed.
async fn write_frames(
    mut sink: FrameSink,
    mut queued: mpsc::Receiver<Message>,
    closed: Arc<watch::Sender<bool>>,
) {
    let mut shutdown = closed.subscribe();

    loop {
        let frame = tokio::select! {
            _ = wait_closed(&mut shutdown) => break,
            frame = queued.recv() => match frame {
                Some(frame) => frame,
                // Every handle is gone.
                None => break,
            },
        };

        let written = tokio::select! {
            _ = wait_closed(&mut shutdown) => break,
            result = sink.send(frame) => result,
        };
        if let Err(e) = written {
            tracing::debug!("Write failed, closing connection: {}", e);
            closed.send_replace(true);
            break;
        }
    }

    match tokio::time::timeout(CLOSE_GRACE, sink.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::debug!("Close handshake failed: {}", e),
        Err(_) => tracing::debug!("Close handshake timed out"),
    }
}

/// In-memory transports for unit tests.
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use futures::channel::mpsc;
    use futures::StreamExt;

    /// A connection whose outbound frames land in a channel.
    pub(crate) fn channel_connection() -> (Arc<Connection>, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded();
        let sink = tx.sink_map_err(axum::Error::new);
        (Arc::new(Connection::new(sink)), rx)
    }

    /// A connection whose every write fails.
    pub(crate) fn broken_connection() -> Arc<Connection> {
        let (conn, rx) = channel_connection();
        drop(rx);
        conn
    }

    /// A connection whose peer stopped reading: the socket accepts one
    /// frame and then blocks forever, as long as the receiver is held
    /// and never polled.
    pub(crate) fn stalled_connection(capacity: usize) -> (Arc<Connection>, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(0);
        let sink = tx.sink_map_err(axum::Error::new);
        (Arc::new(Connection::with_capacity(sink, capacity)), rx)
    }

    /// Decode every text frame written until the channel goes quiet.
    pub(crate) async fn drain_messages(
        rx: &mut mpsc::UnboundedReceiver<Message>,
    ) -> Vec<SignalingMessage> {
        let mut out = Vec::new();
        while let Ok(Some(frame)) = tokio::time::timeout(Duration::from_millis(50), rx.next()).await {
            if let Message::Text(text) = frame {
                out.push(SignalingMessage::from_json(&text).unwrap());
            }
        }
        out
    }

    /// A connection that answers every ping with a pong, like a live browser.
    pub(crate) fn responsive_connection() -> Arc<Connection> {
        let (conn, mut rx) = channel_connection();
        let weak = Arc::downgrade(&conn);
        tokio::spawn(async move {
            while let Some(frame) = rx.next().await {
                if let Message::Ping(_) = frame {
                    match weak.upgrade() {
                        Some(conn) => conn.record_pong(),
                        None => break,
                    }
                }
            }
        });
        conn
    }
}
