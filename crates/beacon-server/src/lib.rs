//! # beacon-server
//!
//! Real-time signaling hub over WebSocket.
//!
//! - Hub coordinator: a single-writer event loop owning the client and room
//!   registries, fed by a bounded command queue
//! - Client sessions: an inbound pump that decodes envelopes and an outbound
//!   pump that drains a bounded mailbox, with heartbeat and read deadline
//! - HTTP surface: authenticated `/ws` upgrade, `/health`, `/metrics`
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod health;
pub mod hub;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::{ServerConfig, SessionConfig};
pub use error::ServerError;
pub use hub::{Hub, HubHandle, HubSnapshot};
pub use server::BeaconServer;
