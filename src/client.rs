//! Client records and the client registry
//!
//! A client record is one logged-in identity bound to the connection it
//! logged in on. Records live in a fixed-capacity slot pool; a slot is free
//! while its record is inactive.

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::{AppError, SendError};
use crate::message::Message;
use crate::types::{ConnectionId, SlotId};

/// Outbound side of one accepted socket
///
/// Frames pushed here are written to the socket, in order, by the
/// connection's write task.
#[derive(Debug, Clone)]
pub struct Connection {
    pub id: ConnectionId,
    sender: mpsc::Sender<Bytes>,
}

impl Connection {
    pub fn new(id: ConnectionId, sender: mpsc::Sender<Bytes>) -> Self {
        Self { id, sender }
    }

    /// Encode and send a message to this connection
    pub async fn send(&self, msg: &Message) -> Result<(), SendError> {
        self.send_frame(Bytes::from(msg.encode())).await
    }

    /// Send an already encoded line
    ///
    /// Returns an error if the channel is closed (connection gone).
    pub async fn send_frame(&self, frame: Bytes) -> Result<(), SendError> {
        self.sender
            .send(frame)
            .await
            .map_err(|_| SendError::ChannelClosed)
    }
}

/// One client slot
#[derive(Debug, Default)]
pub struct ClientRecord {
    /// Identity the client logged in as
    pub id: String,
    /// Credential it logged in with
    pub password: String,
    /// Owning connection (None once released)
    pub connection: Option<Connection>,
    /// Session currently joined
    pub session: Option<String>,
    /// Slot in use
    pub active: bool,
    generation: u64,
}

impl ClientRecord {
    pub fn in_session(&self) -> bool {
        self.session.is_some()
    }

    /// Session name for display, empty when not in one
    pub fn session_name(&self) -> &str {
        self.session.as_deref().unwrap_or("")
    }
}

/// Bounded pool of client records
///
/// Lookups are linear scans over the slots. Callers need `&mut` access to
/// mutate, which the owning actor provides.
#[derive(Debug)]
pub struct ClientRegistry {
    slots: Vec<ClientRecord>,
}

impl ClientRegistry {
    /// Create a registry with a fixed number of slots
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| ClientRecord::default()).collect(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Find the active record for an identity
    pub fn find(&self, id: &str) -> Option<SlotId> {
        self.active()
            .find(|(_, record)| record.id == id)
            .map(|(slot, _)| slot)
    }

    /// Find the active record bound to a connection
    pub fn find_by_connection(&self, connection_id: ConnectionId) -> Option<SlotId> {
        self.active()
            .find(|(_, record)| {
                record
                    .connection
                    .as_ref()
                    .is_some_and(|c| c.id == connection_id)
            })
            .map(|(slot, _)| slot)
    }

    /// Claim the first free slot for a newly logged-in identity
    ///
    /// Fails with `InvalidCredentials` if the identity is already active and
    /// with `ServerFull` if every slot is taken.
    pub fn allocate(
        &mut self,
        id: &str,
        password: &str,
        connection: Connection,
    ) -> Result<SlotId, AppError> {
        if self.find(id).is_some() {
            return Err(AppError::InvalidCredentials);
        }

        let (index, record) = self
            .slots
            .iter_mut()
            .enumerate()
            .find(|(_, record)| !record.active)
            .ok_or(AppError::ServerFull)?;

        record.id = id.to_string();
        record.password = password.to_string();
        record.connection = Some(connection);
        record.session = None;
        record.active = true;

        Ok(SlotId::new(index, record.generation))
    }

    /// Free a slot
    ///
    /// Releasing a stale or already free slot does nothing. Returns whether a
    /// record was actually released.
    pub fn release(&mut self, slot: SlotId) -> bool {
        let Some(record) = self.get_mut(slot) else {
            return false;
        };

        record.session = None;
        record.connection = None;
        record.active = false;
        record.generation += 1;
        true
    }

    /// Resolve a slot handle, None if free or stale
    pub fn get(&self, slot: SlotId) -> Option<&ClientRecord> {
        self.slots
            .get(slot.index)
            .filter(|r| r.active && r.generation == slot.generation)
    }

    pub fn get_mut(&mut self, slot: SlotId) -> Option<&mut ClientRecord> {
        self.slots
            .get_mut(slot.index)
            .filter(|r| r.active && r.generation == slot.generation)
    }

    /// Active records in slot order
    pub fn active(&self) -> impl Iterator<Item = (SlotId, &ClientRecord)> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, r)| r.active)
            .map(|(index, r)| (SlotId::new(index, r.generation), r))
    }

    pub fn active_count(&self) -> usize {
        self.slots.iter().filter(|r| r.active).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection() -> (Connection, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(8);
        (Connection::new(ConnectionId::new(), tx), rx)
    }

    #[test]
    fn test_allocate_and_find() {
        let mut clients = ClientRegistry::new(4);
        let (conn, _rx) = connection();
        let conn_id = conn.id;

        let slot = clients.allocate("a", "1", conn).unwrap();
        assert_eq!(clients.find("a"), Some(slot));
        assert_eq!(clients.find_by_connection(conn_id), Some(slot));
        assert_eq!(clients.find("b"), None);

        let record = clients.get(slot).unwrap();
        assert_eq!(record.id, "a");
        assert!(!record.in_session());
        assert_eq!(record.session_name(), "");
    }

    #[test]
    fn test_duplicate_identity_rejected() {
        let mut clients = ClientRegistry::new(4);
        let (c1, _r1) = connection();
        let (c2, _r2) = connection();

        clients.allocate("a", "1", c1).unwrap();
        let err = clients.allocate("a", "1", c2).unwrap_err();
        assert!(matches!(err, AppError::InvalidCredentials));
        assert_eq!(clients.active_count(), 1);
    }

    #[test]
    fn test_registry_exhausted() {
        let mut clients = ClientRegistry::new(1);
        let (c1, _r1) = connection();
        let (c2, _r2) = connection();

        clients.allocate("a", "1", c1).unwrap();
        let err = clients.allocate("b", "2", c2).unwrap_err();
        assert!(matches!(err, AppError::ServerFull));
    }

    #[test]
    fn test_release_frees_slot_for_reuse() {
        let mut clients = ClientRegistry::new(1);
        let (c1, _r1) = connection();
        let (c2, _r2) = connection();

        let first = clients.allocate("a", "1", c1).unwrap();
        assert!(clients.release(first));
        assert_eq!(clients.find("a"), None);

        let second = clients.allocate("b", "2", c2).unwrap();
        assert_eq!(second.index, first.index);
        assert_ne!(second.generation, first.generation);
    }

    #[test]
    fn test_stale_slot_does_not_resolve() {
        let mut clients = ClientRegistry::new(1);
        let (c1, _r1) = connection();
        let (c2, _r2) = connection();

        let stale = clients.allocate("a", "1", c1).unwrap();
        clients.release(stale);
        clients.allocate("b", "2", c2).unwrap();

        assert!(clients.get(stale).is_none());
        // Releasing through a stale handle must not free the new owner
        assert!(!clients.release(stale));
        assert_eq!(clients.find("b").map(|s| s.index), Some(0));
    }

    #[test]
    fn test_release_is_idempotent() {
        let mut clients = ClientRegistry::new(2);
        let (c1, _r1) = connection();
        let slot = clients.allocate("a", "1", c1).unwrap();

        assert!(clients.release(slot));
        assert!(!clients.release(slot));
        assert_eq!(clients.active_count(), 0);
    }

    #[tokio::test]
    async fn test_connection_send_encodes_line() {
        let (conn, mut rx) = connection();
        conn.send(&Message::ack(crate::message::MessageType::LoginAck, ""))
            .await
            .unwrap();
        assert_eq!(&rx.recv().await.unwrap()[..], b"2:0::\n");
    }

    #[tokio::test]
    async fn test_send_to_closed_connection() {
        let (conn, rx) = connection();
        drop(rx);
        let result = conn.send_frame(Bytes::from_static(b"x\n")).await;
        assert!(matches!(result, Err(SendError::ChannelClosed)));
    }
}
