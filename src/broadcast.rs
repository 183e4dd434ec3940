//! Fan-out of one message to every member of a session

use bytes::Bytes;
use tracing::{debug, warn};

use crate::client::ClientRegistry;
use crate::message::Message;
use crate::room::RoomRegistry;

/// Deliver `msg` to every member of `session`, in join order
///
/// The message is encoded once. A missing session is silently ignored and a
/// failed member write is skipped without retry; that connection is cleaned
/// up by its own disconnect path. Returns how many members were written to.
pub async fn broadcast(
    rooms: &RoomRegistry,
    clients: &ClientRegistry,
    session: &str,
    msg: &Message,
) -> usize {
    let Some(room) = rooms.get_by_name(session) else {
        return 0;
    };

    let frame = Bytes::from(msg.encode());
    let mut delivered = 0;

    for member in room.members() {
        let Some(connection) = clients.get(*member).and_then(|c| c.connection.as_ref()) else {
            warn!("Stale member {} in session {}", member, session);
            continue;
        };

        match connection.send_frame(frame.clone()).await {
            Ok(()) => delivered += 1,
            Err(e) => debug!("Broadcast to {} failed: {}", connection.id, e),
        }
    }

    delivered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Connection;
    use crate::message::MessageType;
    use crate::types::{ConnectionId, SlotId};
    use tokio::sync::mpsc;

    fn login(clients: &mut ClientRegistry, id: &str) -> (SlotId, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(8);
        let slot = clients
            .allocate(id, "pw", Connection::new(ConnectionId::new(), tx))
            .unwrap();
        (slot, rx)
    }

    #[tokio::test]
    async fn test_reaches_every_member() {
        let mut clients = ClientRegistry::new(4);
        let mut rooms = RoomRegistry::new(2, 4);
        let (a, mut ra) = login(&mut clients, "a");
        let (b, mut rb) = login(&mut clients, "b");
        let (_c, mut rc) = login(&mut clients, "c");

        rooms.create("lobby", a, &mut clients).unwrap();
        rooms.join("lobby", b, &mut clients).unwrap();

        let msg = Message::new(MessageType::Chat, 2, "b", "hi");
        assert_eq!(broadcast(&rooms, &clients, "lobby", &msg).await, 2);

        assert_eq!(&ra.recv().await.unwrap()[..], b"11:2:b:hi\n");
        assert_eq!(&rb.recv().await.unwrap()[..], b"11:2:b:hi\n");
        assert!(rc.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_missing_session_is_silent() {
        let clients = ClientRegistry::new(1);
        let rooms = RoomRegistry::new(1, 1);
        let msg = Message::new(MessageType::Chat, 0, "a", "x");
        assert_eq!(broadcast(&rooms, &clients, "nowhere", &msg).await, 0);
    }

    #[tokio::test]
    async fn test_dead_member_does_not_stop_others() {
        let mut clients = ClientRegistry::new(4);
        let mut rooms = RoomRegistry::new(2, 4);
        let (a, ra) = login(&mut clients, "a");
        let (b, mut rb) = login(&mut clients, "b");

        rooms.create("lobby", a, &mut clients).unwrap();
        rooms.join("lobby", b, &mut clients).unwrap();
        drop(ra);

        let msg = Message::new(MessageType::Chat, 1, "a", "x");
        assert_eq!(broadcast(&rooms, &clients, "lobby", &msg).await, 1);
        assert_eq!(&rb.recv().await.unwrap()[..], b"11:1:a:x\n");
    }
}
