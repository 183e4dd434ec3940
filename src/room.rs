//! Session records and the room registry
//!
//! A session ("room") is a named chat channel. Its member list holds
//! [`SlotId`] handles into the client registry, in join order. A session
//! exists exactly as long as it has at least one member. Session names are
//! clamped to `MAX_NAME - 1` bytes on create and join.

use crate::client::ClientRegistry;
use crate::error::AppError;
use crate::message::{truncate, MAX_NAME};
use crate::types::SlotId;

/// One room slot
///
/// The slot is in use iff `id` is non-empty.
#[derive(Debug, Default)]
pub struct RoomRecord {
    /// Session name
    pub id: String,
    members: Vec<SlotId>,
    generation: u64,
}

impl RoomRecord {
    pub fn is_present(&self) -> bool {
        !self.id.is_empty()
    }

    /// Number of members
    pub fn count(&self) -> usize {
        self.members.len()
    }

    /// Member handles in join order
    pub fn members(&self) -> &[SlotId] {
        &self.members
    }

    fn clear(&mut self) {
        self.id.clear();
        self.members.clear();
        self.generation += 1;
    }
}

/// Outcome of a client leaving its session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    /// Session that was left
    pub session: String,
    /// Members still in it; 0 means the session was deleted
    pub remaining: usize,
}

impl Departure {
    pub fn deleted(&self) -> bool {
        self.remaining == 0
    }
}

/// Bounded pool of sessions
#[derive(Debug)]
pub struct RoomRegistry {
    slots: Vec<RoomRecord>,
    max_members: usize,
}

impl RoomRegistry {
    /// Create a registry with `capacity` room slots of `max_members` each
    pub fn new(capacity: usize, max_members: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| RoomRecord::default()).collect(),
            max_members,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Find a present session by name
    pub fn find(&self, id: &str) -> Option<SlotId> {
        self.present()
            .find(|(_, room)| room.id == id)
            .map(|(slot, _)| slot)
    }

    /// Resolve a slot handle, None if empty or stale
    pub fn get(&self, slot: SlotId) -> Option<&RoomRecord> {
        self.slots
            .get(slot.index)
            .filter(|r| r.is_present() && r.generation == slot.generation)
    }

    /// Look a session up by name
    pub fn get_by_name(&self, id: &str) -> Option<&RoomRecord> {
        self.find(id).and_then(|slot| self.get(slot))
    }

    /// Create a session with `founder` as its first member
    pub fn create(
        &mut self,
        id: &str,
        founder: SlotId,
        clients: &mut ClientRegistry,
    ) -> Result<SlotId, AppError> {
        let id = truncate(id, MAX_NAME - 1);
        let client = clients.get_mut(founder).ok_or(AppError::NotLoggedIn)?;
        if client.in_session() {
            return Err(AppError::AlreadyInSession);
        }
        if self.find(id).is_some() {
            return Err(AppError::SessionExists(id.to_string()));
        }

        let (index, room) = self
            .slots
            .iter_mut()
            .enumerate()
            .find(|(_, room)| !room.is_present())
            .ok_or(AppError::MaxSessions)?;

        room.id = id.to_string();
        room.members.push(founder);
        client.session = Some(id.to_string());

        Ok(SlotId::new(index, room.generation))
    }

    /// Add `client` to an existing session
    pub fn join(
        &mut self,
        id: &str,
        client: SlotId,
        clients: &mut ClientRegistry,
    ) -> Result<SlotId, AppError> {
        let id = truncate(id, MAX_NAME - 1);
        let record = clients.get_mut(client).ok_or(AppError::NotLoggedIn)?;
        let slot = self
            .find(id)
            .ok_or_else(|| AppError::SessionNotFound(id.to_string()))?;
        if record.in_session() {
            return Err(AppError::AlreadyInSession);
        }

        let room = &mut self.slots[slot.index];
        if room.count() >= self.max_members {
            return Err(AppError::SessionFull);
        }

        room.members.push(client);
        record.session = Some(room.id.clone());

        Ok(slot)
    }

    /// Remove `client` from whatever session it is in
    ///
    /// Remaining members keep their order. The session is deleted in the same
    /// step if this was its last member. Returns None if the client was not
    /// in a session.
    pub fn leave(&mut self, client: SlotId, clients: &mut ClientRegistry) -> Option<Departure> {
        let record = clients.get_mut(client)?;
        let session = record.session.take()?;

        let slot = self.find(&session)?;
        let room = &mut self.slots[slot.index];
        if let Some(pos) = room.members.iter().position(|m| *m == client) {
            room.members.remove(pos);
        }

        let remaining = room.count();
        if remaining == 0 {
            room.clear();
        }

        Some(Departure { session, remaining })
    }

    /// Present sessions in slot order
    pub fn present(&self) -> impl Iterator<Item = (SlotId, &RoomRecord)> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_present())
            .map(|(index, r)| (SlotId::new(index, r.generation), r))
    }

    pub fn present_count(&self) -> usize {
        self.slots.iter().filter(|r| r.is_present()).count()
    }
}
