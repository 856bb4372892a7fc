//! Signaling messages exchanged over the relay.
//!
//! Every frame on the wire is one JSON object with four string fields.
//! The relay reads `to` and `command`, rewrites `from`, and never looks
//! inside `data`.

use serde::{Deserialize, Serialize};

use crate::{SessionToken, TypesError};

/// Command sent once by the relay to tell a client its own token.
pub const WEBSOCKET_KEY: &str = "websocket-key";
/// SDP answer, forwarded peer to peer.
pub const ANSWER: &str = "answer";
/// ICE candidate, forwarded peer to peer.
pub const ICE_CANDIDATE: &str = "icecandidate";

/// The relay's wire message.
///
/// Missing fields decode as empty strings and unknown fields are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalingMessage {
    /// Sender token. Always overwritten by the relay before forwarding.
    pub from: SessionToken,
    /// Destination token.
    pub to: SessionToken,
    /// Command name, see [`Command`].
    pub command: String,
    /// Opaque payload (often a serialized SDP or ICE structure).
    pub data: String,
}

impl SignalingMessage {
    /// Build a message addressed to `to`.
    pub fn new(
        to: SessionToken,
        command: impl Into<String>,
        data: impl Into<String>,
    ) -> Self {
        Self {
            from: SessionToken::default(),
            to,
            command: command.into(),
            data: data.into(),
        }
    }

    /// The handshake sent to a freshly connected client carrying its token.
    pub fn handshake(token: &SessionToken) -> Self {
        Self {
            command: WEBSOCKET_KEY.to_string(),
            data: token.as_str().to_string(),
            ..Self::default()
        }
    }

    /// Classify the `command` field.
    pub fn command_kind(&self) -> Command {
        Command::parse(&self.command)
    }

    /// Decode from a JSON text frame.
    pub fn from_json(text: &str) -> Result<Self, TypesError> {
        serde_json::from_str(text).map_err(TypesError::Decode)
    }

    /// Decode from a JSON binary frame.
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self, TypesError> {
        serde_json::from_slice(bytes).map_err(TypesError::Decode)
    }

    /// Encode as a JSON text frame.
    pub fn to_json(&self) -> Result<String, TypesError> {
        serde_json::to_string(self).map_err(TypesError::Encode)
    }
}

/// Recognized values of [`SignalingMessage::command`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Server to client handshake carrying the client's token.
    WebsocketKey,
    /// SDP answer.
    Answer,
    /// ICE candidate.
    IceCandidate,
    /// Anything else. Accepted on the wire but never routed.
    Other(String),
}

impl Command {
    /// Classify a raw command string. Matching is exact and case-sensitive.
    pub fn parse(command: &str) -> Self {
        match command {
            WEBSOCKET_KEY => Command::WebsocketKey,
            ANSWER => Command::Answer,
            ICE_CANDIDATE => Command::IceCandidate,
            other => Command::Other(other.to_string()),
        }
    }

    /// Whether the relay forwards messages carrying this command.
    pub fn is_routable(&self) -> bool {
        matches!(self, Command::Answer | Command::IceCandidate)
    }

    /// The wire spelling of this command.
    pub fn as_str(&self) -> &str {
        match self {
            Command::WebsocketKey => WEBSOCKET_KEY,
            Command::Answer => ANSWER,
            Command::IceCandidate => ICE_CANDIDATE,
            Command::Other(other) => other,
        }
    }
}
