//! Room registry: room id to member identities.

use std::collections::{BTreeSet, HashMap};

use beacon_core::ClientId;

/// Result of removing a member from a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// The room did not exist or the client was not in it.
    NotMember,
    /// The client was the last member; the room is gone.
    Emptied,
    /// Other members remain.
    Remaining,
}

/// Rooms exist only while they have members.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: HashMap<String, BTreeSet<ClientId>>,
}

impl RoomRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `client` to `room_id`, creating the room. Returns `false` if it
    /// was already a member.
    pub fn join(&mut self, room_id: &str, client: ClientId) -> bool {
        self.rooms
            .entry(room_id.to_string())
            .or_default()
            .insert(client)
    }

    /// Remove `client` from `room_id`, deleting the room when it empties.
    pub fn leave(&mut self, room_id: &str, client: ClientId) -> LeaveOutcome {
        let Some(members) = self.rooms.get_mut(room_id) else {
            return LeaveOutcome::NotMember;
        };
        if !members.remove(&client) {
            return LeaveOutcome::NotMember;
        }
        if members.is_empty() {
            let _ = self.rooms.remove(room_id);
            LeaveOutcome::Emptied
        } else {
            LeaveOutcome::Remaining
        }
    }

    /// Members of `room_id` in ascending order.
    pub fn members(&self, room_id: &str) -> Option<&BTreeSet<ClientId>> {
        self.rooms.get(room_id)
    }

    /// Members of `room_id` as an owned list (empty if absent).
    pub fn member_ids(&self, room_id: &str) -> Vec<ClientId> {
        self.members(room_id)
            .map(|m| m.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Whether `room_id` exists.
    pub fn contains(&self, room_id: &str) -> bool {
        self.rooms.contains_key(room_id)
    }

    /// Number of live rooms.
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    /// Whether there are no rooms.
    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// Iterate rooms and their members.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &BTreeSet<ClientId>)> {
        self.rooms.iter()
    }

    /// Remove every room.
    pub fn clear(&mut self) {
        self.rooms.clear();
    }
}
