//! TCP connection handler
//!
//! Handles individual client connections: line framing, translating
//! decoded messages into ServerCommands, and writing the actor's responses
//! back to the socket.

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::{BytesCodec, FramedRead, FramedWrite};
use tracing::{debug, error, info, warn};

use crate::codec::MessageCodec;
use crate::error::AppError;
use crate::message::{Message, MessageType};
use crate::server::ServerCommand;
use crate::types::ConnectionId;

/// Outbound frames buffered per connection
const OUTBOUND_BUFFER: usize = 64;

/// Handle a new TCP connection
///
/// Registers the connection with the ChatServer, then reads lines until the
/// peer goes away or the server closes the connection (QUIT). Either way the
/// server is told to clean up whatever the connection left behind.
pub async fn handle_connection(
    stream: TcpStream,
    cmd_tx: mpsc::Sender<ServerCommand>,
) -> Result<(), AppError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    let connection_id = ConnectionId::new();
    info!("Connection {} opened from {}", connection_id, peer_addr);

    let (read_half, write_half) = stream.into_split();
    let mut reader = FramedRead::new(read_half, MessageCodec::server());
    let mut writer = FramedWrite::new(write_half, BytesCodec::new());

    // Channel for server -> client frames
    let (frame_tx, mut frame_rx) = mpsc::channel::<Bytes>(OUTBOUND_BUFFER);

    // Register with ChatServer
    if cmd_tx
        .send(ServerCommand::Connect {
            connection_id,
            sender: frame_tx,
        })
        .await
        .is_err()
    {
        error!("Failed to register connection {} - server closed", connection_id);
        return Err(AppError::ChannelSend);
    }

    // Spawn write task (frames -> socket). It ends when the server drops
    // every sender for this connection or the socket fails.
    let mut write_task = tokio::spawn(async move {
        while let Some(frame) = frame_rx.recv().await {
            if let Err(e) = writer.send(frame).await {
                debug!("Socket write failed, ending write task: {}", e);
                break;
            }
        }
        let _ = SinkExt::<Bytes>::close(&mut writer).await;
    });

    let mut write_done = false;
    loop {
        tokio::select! {
            frame = reader.next() => match frame {
                Some(Ok(msg)) => {
                    let cmd = message_to_command(connection_id, msg);
                    if cmd_tx.send(cmd).await.is_err() {
                        debug!("Server closed, ending read loop for {}", connection_id);
                        break;
                    }
                }
                Some(Err(e)) => {
                    warn!("Read error on {}: {}", connection_id, e);
                    break;
                }
                None => {
                    debug!("Peer closed {}", connection_id);
                    break;
                }
            },
            _ = &mut write_task => {
                debug!("Write task completed for {}", connection_id);
                write_done = true;
                break;
            }
        }
    }

    // Same cleanup as QUIT; a no-op if QUIT already ran
    let _ = cmd_tx
        .send(ServerCommand::Disconnect { connection_id })
        .await;

    if !write_done {
        let _ = write_task.await;
    }

    info!("Connection {} closed", connection_id);

    Ok(())
}

/// Convert a decoded Message to a ServerCommand
///
/// The requester is always identified by its connection; `source` only
/// matters for LOGIN, where it names the identity to log in as.
fn message_to_command(connection_id: ConnectionId, msg: Message) -> ServerCommand {
    match msg.kind {
        MessageType::Login => ServerCommand::Login {
            connection_id,
            id: msg.source,
            password: msg.data,
        },
        MessageType::Logout => ServerCommand::Logout { connection_id },
        MessageType::Join => ServerCommand::Join {
            connection_id,
            session: msg.data,
        },
        MessageType::LeaveSession => ServerCommand::LeaveSession { connection_id },
        MessageType::NewSession => ServerCommand::NewSession {
            connection_id,
            session: msg.data,
        },
        MessageType::Chat => ServerCommand::Chat {
            connection_id,
            message: msg,
        },
        MessageType::Query => ServerCommand::Query { connection_id },
        MessageType::Quit => ServerCommand::Quit { connection_id },
        other => ServerCommand::Unknown {
            connection_id,
            code: other.code(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_uses_source_and_data() {
        let id = ConnectionId::new();
        match message_to_command(id, Message::decode("1:1:a:1")) {
            ServerCommand::Login {
                connection_id,
                id: user,
                password,
            } => {
                assert_eq!(connection_id, id);
                assert_eq!(user, "a");
                assert_eq!(password, "1");
            }
            other => panic!("Wrong command: {:?}", other),
        }
    }

    #[test]
    fn test_session_requests_carry_name() {
        let id = ConnectionId::new();
        assert!(matches!(
            message_to_command(id, Message::decode("5:5:a:lobby")),
            ServerCommand::Join { session, .. } if session == "lobby"
        ));
        assert!(matches!(
            message_to_command(id, Message::decode("9:5:a:lobby")),
            ServerCommand::NewSession { session, .. } if session == "lobby"
        ));
    }

    #[test]
    fn test_server_to_client_tags_are_unknown() {
        let id = ConnectionId::new();
        assert!(matches!(
            message_to_command(id, Message::decode("2:0::")),
            ServerCommand::Unknown { code: 2, .. }
        ));
        assert!(matches!(
            message_to_command(id, Message::decode("")),
            ServerCommand::Unknown { code: 0, .. }
        ));
    }
}
