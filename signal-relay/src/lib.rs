//! # signal-relay
//!
//! WebSocket signaling relay for WebRTC peer connection setup.
//!
//! This crate implements a relay server that:
//! - Accepts WebSocket upgrades from allow-listed origins
//! - Assigns every connection an unguessable session token
//! - Forwards `answer` and `icecandidate` messages between peers by token
//! - Evicts peers that stop answering keepalive pings
//!
//! The relay never interprets or stores payloads.
//!
//! ## Architecture
//!
//! ```text
//! Browser A ──┐                         ┌── Browser B
//!             │   WebSocket (JSON)      │
//!         ┌───┴─────────────────────────┴───┐
//!         │          signal-relay           │
//!         │  Session ──► Router ──► Registry│
//!         │                 ▲               │
//!         │   Keepalive ────┘               │
//!         └─────────────────────────────────┘
//! ```
//!
//! ## Protocol
//!
//! Every frame is `{"from","to","command","data"}`:
//! - `websocket-key` (server → client): the client's own token, sent once on connect
//! - `answer`, `icecandidate` (client → client): forwarded with `from` set by the relay

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod connection;
pub mod error;
pub mod http;
pub mod keepalive;
pub mod origin;
pub mod registry;
pub mod router;
pub mod server;
pub mod session;
