//! # signal-types
//!
//! Wire format types for the WebRTC signaling relay.
//!
//! This crate provides the types shared by the relay and its clients:
//! - [`SessionToken`] - Server-assigned identity of one live connection
//! - [`SignalingMessage`] - The relay's sole wire message (JSON text frame)
//! - [`Command`] - Classification of the `command` field
//! - [`TypesError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod messages;
mod token;

pub use error::TypesError;
pub use messages::{Command, SignalingMessage};
pub use token::SessionToken;
