//! Commands accepted by the hub coordinator.

use std::collections::BTreeMap;

use beacon_core::{ClientId, Envelope, SessionId};
use serde::Serialize;
use tokio::sync::oneshot;

use super::clients::SessionHandle;

/// A unit of work for the coordinator loop.
#[derive(Debug)]
pub enum HubCommand {
    /// Admit a session, evicting any prior session for the same identity.
    Register(SessionHandle),
    /// Remove a session and leave all of its rooms.
    Unregister {
        /// Identity the session was registered under.
        client_id: ClientId,
        /// Must match the registered session or the command is ignored.
        session_id: SessionId,
    },
    /// A decoded envelope read by a session's inbound pump.
    Inbound {
        /// Sender identity.
        client_id: ClientId,
        /// Sender session; stale sessions are ignored.
        session_id: SessionId,
        /// The envelope as read.
        envelope: Envelope,
    },
    /// Report registry sizes and room membership.
    Snapshot(oneshot::Sender<HubSnapshot>),
}

/// Point-in-time view of the coordinator's registries.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct HubSnapshot {
    /// Registered sessions.
    pub clients: usize,
    /// Room id to members in ascending order.
    pub rooms: BTreeMap<String, Vec<ClientId>>,
}

impl HubSnapshot {
    /// Members of `room_id`, if the room exists.
    pub fn members(&self, room_id: &str) -> Option<&[ClientId]> {
        self.rooms.get(room_id).map(Vec::as_slice)
    }
}
