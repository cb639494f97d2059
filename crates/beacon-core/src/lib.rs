//! # beacon-core
//!
//! Shared vocabulary for the Beacon signaling hub.
//!
//! - **Identities**: [`ClientId`] (authenticated caller) and [`SessionId`]
//!   (one physical connection) as newtypes over `u64`
//! - **Envelopes**: [`Envelope`], the routable unit clients send, with its
//!   routing decision exposed as [`Route`]
//! - **Hub messages**: [`HubMessage`]: presence snapshots and membership
//!   notices the hub originates
//! - **Logging**: [`logging::init_subscriber`] for the `tracing` subscriber

#![deny(unsafe_code)]

pub mod envelope;
pub mod ids;
pub mod logging;
pub mod messages;

pub use envelope::{Envelope, EnvelopeError, Route};
pub use ids::{ClientId, SessionId};
pub use messages::HubMessage;
