//! ChatServer Actor implementation
//!
//! The central actor that owns all shared state: the client registry, the
//! room registry and the table of open connections. Connection handlers
//! talk to it over an mpsc channel, so every registry access happens on this
//! one task and cross-registry operations never interleave.

use std::collections::HashMap;

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::broadcast::broadcast;
use crate::client::{ClientRegistry, Connection};
use crate::config::{CredentialStore, ServerConfig};
use crate::error::AppError;
use crate::message::{flatten_lines, truncate, Message, MessageType, MAX_DATA, SERVER_SOURCE};
use crate::room::RoomRegistry;
use crate::types::{ConnectionId, SlotId};

/// Commands sent from handlers to the ChatServer actor
#[derive(Debug)]
pub enum ServerCommand {
    /// New socket accepted
    Connect {
        connection_id: ConnectionId,
        sender: mpsc::Sender<Bytes>,
    },
    /// Socket closed or failed
    Disconnect { connection_id: ConnectionId },
    /// LOGIN
    Login {
        connection_id: ConnectionId,
        id: String,
        password: String,
    },
    /// LOGOUT
    Logout { connection_id: ConnectionId },
    /// JOIN
    Join {
        connection_id: ConnectionId,
        session: String,
    },
    /// LEAVE_SESS
    LeaveSession { connection_id: ConnectionId },
    /// NEW_SESS
    NewSession {
        connection_id: ConnectionId,
        session: String,
    },
    /// MESSAGE, relayed to the sender's session
    Chat {
        connection_id: ConnectionId,
        message: Message,
    },
    /// QUERY
    Query { connection_id: ConnectionId },
    /// QUIT
    Quit { connection_id: ConnectionId },
    /// Anything else
    Unknown {
        connection_id: ConnectionId,
        code: u32,
    },
}

/// The main ChatServer actor
pub struct ChatServer {
    /// Logged-in clients
    clients: ClientRegistry,
    /// Present sessions
    rooms: RoomRegistry,
    /// Every open socket, logged in or not
    connections: HashMap<ConnectionId, Connection>,
    credentials: CredentialStore,
    /// Command receiver channel
    receiver: mpsc::Receiver<ServerCommand>,
}

impl ChatServer {
    /// Create a new ChatServer with the given configuration and command receiver
    pub fn new(config: ServerConfig, receiver: mpsc::Receiver<ServerCommand>) -> Self {
        Self {
            clients: ClientRegistry::new(config.max_clients),
            rooms: RoomRegistry::new(config.max_sessions, config.max_members),
            connections: HashMap::new(),
            credentials: config.credentials,
            receiver,
        }
    }

    /// Run the ChatServer event loop
    ///
    /// Continuously receives and processes commands until all senders are dropped.
    pub async fn run(mut self) {
        info!(
            "ChatServer started ({} client slots, {} session slots)",
            self.clients.capacity(),
            self.rooms.capacity()
        );

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd).await;
        }

        info!("ChatServer shutting down");
    }

    /// Process a single command
    async fn handle_command(&mut self, cmd: ServerCommand) {
        match cmd {
            ServerCommand::Connect {
                connection_id,
                sender,
            } => {
                self.connections
                    .insert(connection_id, Connection::new(connection_id, sender));
                debug!("Open connections: {}", self.connections.len());
            }
            ServerCommand::Disconnect { connection_id } => {
                self.handle_disconnect(connection_id);
            }
            ServerCommand::Login {
                connection_id,
                id,
                password,
            } => {
                self.handle_login(connection_id, id, password).await;
            }
            ServerCommand::Logout { connection_id } => {
                self.handle_logout(connection_id).await;
            }
            ServerCommand::Join {
                connection_id,
                session,
            } => {
                self.handle_join(connection_id, session).await;
            }
            ServerCommand::LeaveSession { connection_id } => {
                self.handle_leave_session(connection_id).await;
            }
            ServerCommand::NewSession {
                connection_id,
                session,
            } => {
                self.handle_new_session(connection_id, session).await;
            }
            ServerCommand::Chat {
                connection_id,
                message,
            } => {
                self.handle_chat(connection_id, message).await;
            }
            ServerCommand::Query { connection_id } => {
                self.handle_query(connection_id).await;
            }
            ServerCommand::Quit { connection_id } => {
                self.handle_quit(connection_id).await;
            }
            ServerCommand::Unknown {
                connection_id,
                code,
            } => {
                debug!("Unknown command {} from {}", code, connection_id);
                self.reply(connection_id, AppError::UnknownCommand(code).into())
                    .await;
            }
        }
    }

    /// Handle LOGIN
    async fn handle_login(&mut self, connection_id: ConnectionId, id: String, password: String) {
        let Some(connection) = self.connections.get(&connection_id) else {
            return;
        };

        let result = if self.clients.find_by_connection(connection_id).is_some() {
            Err(AppError::AlreadyLoggedIn)
        } else if !self.credentials.verify(&id, &password) {
            Err(AppError::InvalidCredentials)
        } else {
            self.clients.allocate(&id, &password, connection.clone())
        };

        let reply = match result {
            Ok(slot) => {
                info!("Client '{}' logged in on {} (slot {})", id, connection_id, slot);
                Message::ack(MessageType::LoginAck, "")
            }
            Err(e) => {
                warn!("Login as '{}' on {} rejected: {}", id, connection_id, e);
                e.into()
            }
        };

        self.reply(connection_id, reply).await;
    }

    /// Handle LOGOUT: always acknowledged, the connection stays open
    async fn handle_logout(&mut self, connection_id: ConnectionId) {
        self.release_client(connection_id);
        self.reply(connection_id, Message::ack(MessageType::Logout, ""))
            .await;
    }

    /// Handle JOIN
    async fn handle_join(&mut self, connection_id: ConnectionId, session: String) {
        let result = self
            .logged_in(connection_id)
            .and_then(|slot| self.rooms.join(&session, slot, &mut self.clients));

        let reply = match result {
            Ok(slot) => {
                let name = self.session_name(slot);
                info!("{} joined session '{}'", self.identity(connection_id), name);
                Message::ack(MessageType::JoinAck, name)
            }
            Err(e) => {
                debug!("Join of '{}' from {} rejected: {}", session, connection_id, e);
                e.into()
            }
        };

        self.reply(connection_id, reply).await;
    }

    /// Handle LEAVE_SESS
    async fn handle_leave_session(&mut self, connection_id: ConnectionId) {
        let reply = match self.logged_in(connection_id) {
            // Reported on the login channel rather than as a join failure
            Err(e) => Message::ack(MessageType::LoginNak, e.reason()),
            Ok(slot) => match self.rooms.leave(slot, &mut self.clients) {
                Some(departure) => {
                    info!(
                        "{} left session '{}'",
                        self.identity(connection_id),
                        departure.session
                    );
                    if departure.deleted() {
                        info!("Session '{}' deleted (empty)", departure.session);
                    }
                    Message::ack(MessageType::LeaveSession, "Left session successfully")
                }
                None => AppError::NotInSession.into(),
            },
        };

        self.reply(connection_id, reply).await;
    }

    /// Handle NEW_SESS: create and auto-join the founder
    async fn handle_new_session(&mut self, connection_id: ConnectionId, session: String) {
        let result = self
            .logged_in(connection_id)
            .and_then(|slot| self.rooms.create(&session, slot, &mut self.clients));

        let reply = match result {
            Ok(slot) => {
                let name = self.session_name(slot);
                info!("{} created session '{}'", self.identity(connection_id), name);
                Message::ack(MessageType::NewSessionAck, name)
            }
            Err(e) => {
                debug!("Create of '{}' from {} rejected: {}", session, connection_id, e);
                e.into()
            }
        };

        self.reply(connection_id, reply).await;
    }

    /// Handle MESSAGE: relay to the sender's session, no reply
    async fn handle_chat(&mut self, connection_id: ConnectionId, message: Message) {
        let Some(record) = self
            .clients
            .find_by_connection(connection_id)
            .and_then(|slot| self.clients.get(slot))
        else {
            debug!("Dropping chat from {}: not logged in", connection_id);
            return;
        };
        let Some(session) = record.session.as_deref() else {
            debug!("Dropping chat from '{}': not in a session", record.id);
            return;
        };

        // The bound identity replaces whatever source the sender claimed
        let relayed = Message::new(MessageType::Chat, message.size, &record.id, message.data);
        let delivered = broadcast(&self.rooms, &self.clients, session, &relayed).await;
        debug!("Chat from '{}' delivered to {} member(s)", record.id, delivered);
    }

    /// Handle QUERY
    async fn handle_query(&mut self, connection_id: ConnectionId) {
        let listing = status_listing(&self.clients, &self.rooms);
        let size = u32::try_from(listing.len()).unwrap_or(u32::MAX);
        let data = truncate(&listing, MAX_DATA - 1);

        self.reply(
            connection_id,
            Message::new(MessageType::QueryAck, size, SERVER_SOURCE, data),
        )
        .await;
    }

    /// Handle QUIT: logout cleanup, acknowledge, then close the connection
    async fn handle_quit(&mut self, connection_id: ConnectionId) {
        self.release_client(connection_id);
        self.reply(connection_id, Message::ack(MessageType::Quit, ""))
            .await;

        // Dropping the last sender ends the write task once the ack is flushed
        self.connections.remove(&connection_id);
        debug!("Connection {} closed on quit", connection_id);
    }

    /// Handle socket loss: same cleanup as QUIT, without the reply
    fn handle_disconnect(&mut self, connection_id: ConnectionId) {
        self.release_client(connection_id);
        if self.connections.remove(&connection_id).is_some() {
            debug!(
                "Connection {} removed. Clients: {}, sessions: {}",
                connection_id,
                self.clients.active_count(),
                self.rooms.present_count()
            );
        }
    }

    /// Leave the session (if any), then free the client slot
    ///
    /// The member handle is removed before the slot is released, so no
    /// session ever lists a released client.
    fn release_client(&mut self, connection_id: ConnectionId) {
        let Some(slot) = self.clients.find_by_connection(connection_id) else {
            return;
        };

        if let Some(departure) = self.rooms.leave(slot, &mut self.clients) {
            if departure.deleted() {
                info!("Session '{}' deleted (empty)", departure.session);
            }
        }

        let id = self.identity(connection_id);
        self.clients.release(slot);
        info!("Client '{}' logged out", id);
    }

    fn logged_in(&self, connection_id: ConnectionId) -> Result<SlotId, AppError> {
        self.clients
            .find_by_connection(connection_id)
            .ok_or(AppError::NotLoggedIn)
    }

    fn identity(&self, connection_id: ConnectionId) -> String {
        self.clients
            .find_by_connection(connection_id)
            .and_then(|slot| self.clients.get(slot))
            .map(|r| r.id.clone())
            .unwrap_or_default()
    }

    fn session_name(&self, slot: SlotId) -> String {
        self.rooms
            .get(slot)
            .map(|r| r.id.clone())
            .unwrap_or_default()
    }

    /// Send one response line to a connection, ignoring a closed channel
    async fn reply(&self, connection_id: ConnectionId, msg: Message) {
        let Some(connection) = self.connections.get(&connection_id) else {
            return;
        };
        if let Err(e) = connection.send(&msg).await {
            debug!("Reply to {} dropped: {}", connection_id, e);
        }
    }
}

/// Build the QUERY listing: online users with their session, then sessions
/// with their member counts, flattened onto one line
pub fn status_listing(clients: &ClientRegistry, rooms: &RoomRegistry) -> String {
    let mut list = String::from("=== Online Users ===\n");
    for (_, client) in clients.active() {
        list.push_str(&format!("- {} (in {})\n", client.id, client.session_name()));
    }

    list.push_str("\n=== Active Sessions ===\n");
    for (_, room) in rooms.present() {
        list.push_str(&format!("- {} ({} participants)\n", room.id, room.count()));
    }

    flatten_lines(&list)
}
