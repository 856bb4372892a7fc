//! Error types for signal-relay.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Main error type for signal-relay operations.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Failed to bind the listener.
    #[error("failed to bind {address}: {source}")]
    Bind {
        /// The address that could not be bound.
        address: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors writing to or probing a single connection.
///
/// None of these are fatal beyond the connection they occurred on.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// The connection was already closed.
    #[error("connection closed")]
    Closed,

    /// The outbound queue is full; the peer is not draining its socket.
    #[error("outbound queue full")]
    QueueFull,

    /// The peer did not acknowledge a ping in time.
    #[error("ping not acknowledged within {timeout_ms}ms")]
    AckTimeout {
        /// The acknowledgment deadline.
        timeout_ms: u128,
    },

    /// The outbound message could not be encoded.
    #[error("encode error: {0}")]
    Encode(#[from] signal_types::TypesError),
}

/// An upgrade request refused by the origin policy.
///
/// The connection never reaches the registry.
#[derive(Debug, thiserror::Error)]
#[error("origin not allowed: {}", origin.as_deref().unwrap_or("<missing>"))]
pub struct UpgradeRejected {
    /// The offending `Origin` header, if the request carried a readable one.
    pub origin: Option<String>,
}

impl IntoResponse for UpgradeRejected {
    fn into_response(self) -> Response {
        (StatusCode::FORBIDDEN, self.to_string()).into_response()
    }
}

/// Result type alias for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;

/// Result type alias for connection operations.
pub type ConnectionResult<T> = std::result::Result<T, ConnectionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upgrade_rejected_is_forbidden() {
        let response = UpgradeRejected {
            origin: Some("https://evil.example".to_string()),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn upgrade_rejected_display() {
        let err = UpgradeRejected { origin: None };
        assert_eq!(err.to_string(), "origin not allowed: <missing>");
    }

    #[test]
    fn invalid_config_becomes_relay_error() {
        let mut config = crate::config::Config::default();
        config.keepalive.interval_secs = 0;

        let err: RelayError = config.validate().unwrap_err().into();
        assert!(matches!(err, RelayError::Config(_)));
        assert!(err.to_string().starts_with("configuration error:"));
    }

    #[test]
    fn serve_failure_becomes_relay_error() {
        let io = std::io::Error::from(std::io::ErrorKind::ConnectionAborted);
        let result: Result<()> = Err(io.into());
        assert!(matches!(result, Err(RelayError::Io(_))));
    }

    #[test]
    fn queue_full_display() {
        assert_eq!(ConnectionError::QueueFull.to_string(), "outbound queue full");
    }

    #[test]
    fn ack_timeout_display() {
        let err = ConnectionError::AckTimeout { timeout_ms: 10_000 };
        assert_eq!(err.to_string(), "ping not acknowledged within 10000ms");
    }
}
