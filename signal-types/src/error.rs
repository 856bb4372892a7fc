//! Error types for signaling wire types.

use thiserror::Error;

/// Errors that can occur while encoding or decoding signaling messages.
#[derive(Debug, Error)]
pub enum TypesError {
    /// JSON decoding failed
    #[error("decode failed: {0}")]
    Decode(#[source] serde_json::Error),

    /// JSON encoding failed
    #[error("encode failed: {0}")]
    Encode(#[source] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = serde_json::from_str::<u32>("nope").unwrap_err();
        let err = TypesError::Decode(err);
        assert!(err.to_string().starts_with("decode failed: "));
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TypesError>();
    }
}
