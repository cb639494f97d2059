//! The coordinator event loop and the handle sessions use to reach it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::ws::Utf8Bytes;
use beacon_core::{ClientId, Envelope, HubMessage, Route, SessionId};
use metrics::{counter, gauge};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::clients::{ClientEntry, ClientRegistry, SessionHandle};
use super::command::{HubCommand, HubSnapshot};
use super::rooms::{LeaveOutcome, RoomRegistry};
use crate::error::ServerError;
use crate::metrics::{
    MESSAGES_DROPPED_TOTAL, MESSAGES_ROUTED_TOTAL, ROOMS_ACTIVE, SESSIONS_ACTIVE,
    SESSIONS_EVICTED_TOTAL,
};

/// Create a coordinator and the handle that feeds it.
pub fn channel(capacity: usize, shutdown: CancellationToken) -> (Hub, HubHandle) {
    let (tx, rx) = mpsc::channel(capacity);
    let hub = Hub {
        clients: ClientRegistry::new(),
        rooms: RoomRegistry::new(),
        commands: rx,
        shutdown,
    };
    let handle = HubHandle {
        commands: tx,
        next_session: Arc::new(AtomicU64::new(1)),
    };
    (hub, handle)
}

/// Cloneable sender side of the coordinator's command queue.
#[derive(Clone, Debug)]
pub struct HubHandle {
    commands: mpsc::Sender<HubCommand>,
    next_session: Arc<AtomicU64>,
}

impl HubHandle {
    /// Allocate the next session id. Ids increase monotonically.
    pub fn next_session_id(&self) -> SessionId {
        SessionId::new(self.next_session.fetch_add(1, Ordering::Relaxed))
    }

    /// Admit a session.
    pub async fn register(&self, handle: SessionHandle) -> Result<(), ServerError> {
        self.send(HubCommand::Register(handle)).await
    }

    /// Remove a session. A no-op if it was already superseded.
    pub async fn unregister(&self, client_id: ClientId, session_id: SessionId) {
        if self
            .send(HubCommand::Unregister {
                client_id,
                session_id,
            })
            .await
            .is_err()
        {
            debug!(%client_id, %session_id, "hub stopped before unregister");
        }
    }

    /// Submit an envelope for routing.
    pub async fn submit(
        &self,
        client_id: ClientId,
        session_id: SessionId,
        envelope: Envelope,
    ) -> Result<(), ServerError> {
        self.send(HubCommand::Inbound {
            client_id,
            session_id,
            envelope,
        })
        .await
    }

    /// Ask the coordinator for a consistent view of its registries.
    pub async fn snapshot(&self) -> Result<HubSnapshot, ServerError> {
        let (tx, rx) = oneshot::channel();
        self.send(HubCommand::Snapshot(tx)).await?;
        rx.await.map_err(|_| ServerError::HubClosed)
    }

    async fn send(&self, command: HubCommand) -> Result<(), ServerError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| ServerError::HubClosed)
    }
}

/// Single owner of routing state.
///
/// Every registry mutation and fan-out decision happens inside
/// [`Hub::handle`], one command at a time, so presence snapshots always
/// reflect the mutation that triggered them.
pub struct Hub {
    clients: ClientRegistry,
    rooms: RoomRegistry,
    commands: mpsc::Receiver<HubCommand>,
    shutdown: CancellationToken,
}

impl Hub {
    /// Process commands until shutdown or until every handle is dropped.
    ///
    /// On exit every remaining session is terminated; queued messages are
    /// not drained.
    pub async fn run(mut self) {
        info!("hub coordinator started");
        loop {
            tokio::select! {
                biased;
                () = self.shutdown.cancelled() => break,
                command = self.commands.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
            }
        }
        self.close_all();
        info!("hub coordinator stopped");
    }

    /// Apply one command.
    pub fn handle(&mut self, command: HubCommand) {
        match command {
            HubCommand::Register(handle) => self.register(handle),
            HubCommand::Unregister {
                client_id,
                session_id,
            } => self.unregister(client_id, session_id),
            HubCommand::Inbound {
                client_id,
                session_id,
                envelope,
            } => self.inbound(client_id, session_id, envelope),
            HubCommand::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    /// Current registry view.
    pub fn snapshot(&self) -> HubSnapshot {
        HubSnapshot {
            clients: self.clients.len(),
            rooms: self
                .rooms
                .iter()
                .map(|(id, members)| (id.clone(), members.iter().copied().collect()))
                .collect(),
        }
    }

    fn register(&mut self, handle: SessionHandle) {
        let client_id = handle.client_id();
        let session_id = handle.session_id();

        if let Some(old) = self.detach(client_id) {
            info!(
                %client_id,
                old_session = %old.handle.session_id(),
                new_session = %session_id,
                dropped = old.handle.dropped(),
                "evicting superseded session"
            );
            counter!(SESSIONS_EVICTED_TOTAL).increment(1);
            old.handle.terminate();
        }

        let _ = self.clients.insert(handle);
        debug!(%client_id, %session_id, "session registered");
        self.record_gauges();
    }

    fn unregister(&mut self, client_id: ClientId, session_id: SessionId) {
        if !self.clients.is_current(client_id, session_id) {
            debug!(%client_id, %session_id, "ignoring unregister for stale session");
            return;
        }
        if let Some(entry) = self.detach(client_id) {
            debug!(
                %client_id,
                %session_id,
                dropped = entry.handle.dropped(),
                "session unregistered"
            );
        }
        self.record_gauges();
    }

    /// Remove a client from the registry and every room it joined, notifying
    /// the remaining members. Dropping the returned entry closes its mailbox.
    fn detach(&mut self, client_id: ClientId) -> Option<ClientEntry> {
        let entry = self.clients.remove(client_id)?;
        for room_id in &entry.rooms {
            self.depart(room_id, client_id);
        }
        Some(entry)
    }

    fn inbound(&mut self, client_id: ClientId, session_id: SessionId, mut envelope: Envelope) {
        if !self.clients.is_current(client_id, session_id) {
            debug!(%client_id, %session_id, "dropping envelope from stale session");
            counter!(MESSAGES_DROPPED_TOTAL, "reason" => "stale_session").increment(1);
            return;
        }
        envelope.stamp_sender(client_id);

        match envelope.route() {
            Route::Direct(target) => self.route_direct(client_id, target, &envelope),
            Route::Join(room_id) => self.join(client_id, &room_id),
            Route::Leave(room_id) => self.leave(client_id, &room_id),
            Route::Room(room_id) => self.route_room(client_id, &room_id, &envelope),
            Route::Unroutable => {
                debug!(%client_id, kind = ?envelope.kind(), "dropping unroutable envelope");
                counter!(MESSAGES_DROPPED_TOTAL, "reason" => "unroutable").increment(1);
            }
        }
    }

    fn route_direct(&self, sender: ClientId, target: ClientId, envelope: &Envelope) {
        let Some(entry) = self.clients.get(target) else {
            debug!(%sender, %target, "direct target not connected");
            counter!(MESSAGES_DROPPED_TOTAL, "reason" => "unknown_target").increment(1);
            return;
        };
        let Some(frame) = envelope_frame(envelope) else {
            return;
        };
        let _ = entry.handle.deliver(frame);
        counter!(MESSAGES_ROUTED_TOTAL, "route" => "direct").increment(1);
    }

    fn route_room(&self, sender: ClientId, room_id: &str, envelope: &Envelope) {
        if !self.rooms.contains(room_id) {
            debug!(%sender, room_id, "room not found");
            counter!(MESSAGES_DROPPED_TOTAL, "reason" => "unknown_room").increment(1);
            return;
        }
        let Some(frame) = envelope_frame(envelope) else {
            return;
        };
        self.fan_out(room_id, &frame, Some(sender));
        counter!(MESSAGES_ROUTED_TOTAL, "route" => "room").increment(1);
    }

    fn join(&mut self, client_id: ClientId, room_id: &str) {
        let Some(entry) = self.clients.get_mut(client_id) else {
            return;
        };
        if !entry.rooms.insert(room_id.to_string()) {
            debug!(%client_id, room_id, "already in room");
            return;
        }
        let _ = self.rooms.join(room_id, client_id);
        info!(%client_id, room_id, "joined room");

        let joined = HubMessage::UserJoined {
            room_id: room_id.to_string(),
            user_id: client_id,
        };
        if let Some(frame) = hub_frame(&joined) {
            self.fan_out(room_id, &frame, Some(client_id));
        }
        self.broadcast_presence(room_id);
        counter!(MESSAGES_ROUTED_TOTAL, "route" => "join").increment(1);
        self.record_gauges();
    }

    fn leave(&mut self, client_id: ClientId, room_id: &str) {
        let Some(entry) = self.clients.get_mut(client_id) else {
            return;
        };
        if !entry.rooms.remove(room_id) {
            debug!(%client_id, room_id, "leave for room not joined");
            return;
        }
        self.depart(room_id, client_id);
        counter!(MESSAGES_ROUTED_TOTAL, "route" => "leave").increment(1);
        self.record_gauges();
    }

    /// Room-side half of leaving: update membership and tell who remains.
    fn depart(&mut self, room_id: &str, client_id: ClientId) {
        match self.rooms.leave(room_id, client_id) {
            LeaveOutcome::NotMember => {}
            LeaveOutcome::Emptied => {
                info!(%client_id, room_id, "left room, room closed");
            }
            LeaveOutcome::Remaining => {
                info!(%client_id, room_id, "left room");
                let left = HubMessage::UserLeft {
                    room_id: room_id.to_string(),
                    user_id: client_id,
                };
                if let Some(frame) = hub_frame(&left) {
                    self.fan_out(room_id, &frame, None);
                }
                self.broadcast_presence(room_id);
            }
        }
    }

    fn broadcast_presence(&self, room_id: &str) {
        let presence = HubMessage::RoomPresence {
            room_id: room_id.to_string(),
            user_ids: self.rooms.member_ids(room_id),
        };
        if let Some(frame) = hub_frame(&presence) {
            self.fan_out(room_id, &frame, None);
        }
    }

    fn fan_out(&self, room_id: &str, frame: &Utf8Bytes, except: Option<ClientId>) {
        let Some(members) = self.rooms.members(room_id) else {
            return;
        };
        for member in members.iter().filter(|m| Some(**m) != except) {
            match self.clients.get(*member) {
                Some(entry) => {
                    let _ = entry.handle.deliver(frame.clone());
                }
                None => warn!(client_id = %member, room_id, "room member has no session"),
            }
        }
    }

    fn close_all(&mut self) {
        let count = self.clients.len();
        for entry in self.clients.drain() {
            entry.handle.terminate();
        }
        self.rooms.clear();
        if count > 0 {
            info!(count, "terminated remaining sessions");
        }
        self.record_gauges();
    }

    #[allow(clippy::cast_precision_loss)]
    fn record_gauges(&self) {
        gauge!(SESSIONS_ACTIVE).set(self.clients.len() as f64);
        gauge!(ROOMS_ACTIVE).set(self.rooms.len() as f64);
    }
}

fn envelope_frame(envelope: &Envelope) -> Option<Utf8Bytes> {
    match envelope.to_json() {
        Ok(json) => Some(Utf8Bytes::from(json)),
        Err(e) => {
            error!(error = %e, "failed to serialize envelope");
            None
        }
    }
}

fn hub_frame(message: &HubMessage) -> Option<Utf8Bytes> {
    match message.to_json() {
        Ok(json) => Some(Utf8Bytes::from(json)),
        Err(e) => {
            error!(error = %e, "failed to serialize hub message");
            None
        }
    }
}
