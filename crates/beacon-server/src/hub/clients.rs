//! Client registry: one live session per identity.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::ws::Utf8Bytes;
use beacon_core::{ClientId, SessionId};
use metrics::counter;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::metrics::MAILBOX_DROPS_TOTAL;

/// The coordinator's view of one connected session.
///
/// Holds the only sender for the session's mailbox, so dropping the handle
/// ends the outbound pump.
#[derive(Clone, Debug)]
pub struct SessionHandle {
    client_id: ClientId,
    session_id: SessionId,
    mailbox: mpsc::Sender<Utf8Bytes>,
    cancel: CancellationToken,
    dropped: Arc<AtomicU64>,
}

impl SessionHandle {
    /// Wrap a session's mailbox sender and cancellation token.
    pub fn new(
        client_id: ClientId,
        session_id: SessionId,
        mailbox: mpsc::Sender<Utf8Bytes>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            client_id,
            session_id,
            mailbox,
            cancel,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Identity this session authenticated as.
    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    /// Hub-assigned connection id.
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Enqueue a frame without waiting.
    ///
    /// A full mailbox drops the frame (newest loses). Returns `false` when
    /// the frame was not queued. Clones of one frame share a buffer, so room
    /// fan-out does not copy the payload.
    pub fn deliver(&self, frame: Utf8Bytes) -> bool {
        match self.mailbox.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                counter!(MAILBOX_DROPS_TOTAL).increment(1);
                warn!(
                    client_id = %self.client_id,
                    session_id = %self.session_id,
                    dropped,
                    "mailbox full, dropping frame"
                );
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(
                    client_id = %self.client_id,
                    session_id = %self.session_id,
                    "mailbox closed, dropping frame"
                );
                false
            }
        }
    }

    /// Frames dropped because the mailbox was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Force the session's pumps to stop.
    pub fn terminate(&self) {
        self.cancel.cancel();
    }
}

/// A registered session and the rooms it has joined.
#[derive(Debug)]
pub struct ClientEntry {
    /// The live session.
    pub handle: SessionHandle,
    /// Rooms this client is a member of.
    pub rooms: BTreeSet<String>,
}

/// Identity to live session.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    entries: HashMap<ClientId, ClientEntry>,
}

impl ClientRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `handle`, returning the entry it replaced.
    pub fn insert(&mut self, handle: SessionHandle) -> Option<ClientEntry> {
        self.entries.insert(
            handle.client_id(),
            ClientEntry {
                handle,
                rooms: BTreeSet::new(),
            },
        )
    }

    /// Remove whatever session is registered for `client_id`.
    pub fn remove(&mut self, client_id: ClientId) -> Option<ClientEntry> {
        self.entries.remove(&client_id)
    }

    /// Whether `session_id` is the live session for `client_id`.
    pub fn is_current(&self, client_id: ClientId, session_id: SessionId) -> bool {
        self.entries
            .get(&client_id)
            .is_some_and(|e| e.handle.session_id() == session_id)
    }

    /// Look up a client's entry.
    pub fn get(&self, client_id: ClientId) -> Option<&ClientEntry> {
        self.entries.get(&client_id)
    }

    /// Look up a client's entry mutably.
    pub fn get_mut(&mut self, client_id: ClientId) -> Option<&mut ClientEntry> {
        self.entries.get_mut(&client_id)
    }

    /// Registered session count.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no sessions are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove every entry.
    pub fn drain(&mut self) -> impl Iterator<Item = ClientEntry> + '_ {
        self.entries.drain().map(|(_, entry)| entry)
    }
}
