//! Client protocol driver
//!
//! Two paths run concurrently: the command path ([`ClientDriver::execute`])
//! turns user commands into requests, and a spawned receiver decodes
//! whatever the server pushes. The receiver is the only writer of the
//! cached [`SessionState`]; it publishes every change through a `watch`
//! channel and reports what happened as [`Notice`]s on an mpsc channel.
//! The command path only reads the latest snapshot, so its checks are
//! provisional; the server's next acknowledgement decides.

use std::fmt;

use futures_util::{SinkExt, StreamExt};
use tokio::io::AsyncRead;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info};

use crate::codec::MessageCodec;
use crate::command::Command;
use crate::message::{restore_lines, truncate, Message, MessageType, MAX_NAME};

/// Server-confirmed session state as last seen by the receiver
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub logged_in: bool,
    pub identity: String,
    pub session: Option<String>,
}

impl SessionState {
    pub fn in_session(&self) -> bool {
        self.session.is_some()
    }
}

/// Something the receiver wants shown to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    LoginOk,
    LoginFailed(String),
    LoggedOut,
    Joined(String),
    JoinFailed(String),
    Left(String),
    Created(String),
    Chat { from: String, text: String },
    /// QUERY listing with line breaks restored
    Status(String),
    QuitAck,
    Unknown(u32),
    /// The server connection closed or failed
    ConnectionLost,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::LoginOk => write!(f, "Login successful"),
            Notice::LoginFailed(reason) => write!(f, "Login failed: {}", reason),
            Notice::LoggedOut => write!(f, "Logged out successfully. You can log in again."),
            Notice::Joined(session) => write!(f, "Joined session: {}", session),
            Notice::JoinFailed(reason) => write!(f, "Join failed: {}", reason),
            Notice::Left(detail) => write!(f, "Left session: {}", detail),
            Notice::Created(session) => write!(f, "Created & joined session: {}", session),
            Notice::Chat { from, text } => write!(f, "[{}] {}", from, text),
            Notice::Status(listing) => write!(f, "=== Server Status ===\n{}", listing),
            Notice::QuitAck => write!(f, "Quit acknowledged by server"),
            Notice::Unknown(code) => write!(f, "Received unknown message type: {}", code),
            Notice::ConnectionLost => write!(f, "Connection lost"),
        }
    }
}

/// Fold one server message into the cached state
///
/// `identity` is the name this connection logged in as; it is recorded when
/// the login is acknowledged.
pub fn apply(state: &mut SessionState, identity: &str, msg: Message) -> Notice {
    match msg.kind {
        MessageType::LoginAck => {
            state.logged_in = true;
            state.identity = identity.to_string();
            Notice::LoginOk
        }
        MessageType::LoginNak => Notice::LoginFailed(msg.data),
        MessageType::Logout => {
            *state = SessionState::default();
            Notice::LoggedOut
        }
        MessageType::JoinAck => {
            let session = truncate(&msg.data, MAX_NAME - 1).to_string();
            state.session = Some(session.clone());
            Notice::Joined(session)
        }
        MessageType::JoinNak => Notice::JoinFailed(msg.data),
        MessageType::LeaveSession => {
            state.session = None;
            Notice::Left(msg.data)
        }
        MessageType::NewSessionAck => {
            let session = truncate(&msg.data, MAX_NAME - 1).to_string();
            state.session = Some(session.clone());
            Notice::Created(session)
        }
        MessageType::Chat => Notice::Chat {
            from: msg.source,
            text: msg.data,
        },
        MessageType::QueryAck => Notice::Status(restore_lines(&msg.data)),
        MessageType::Quit => Notice::QuitAck,
        other => Notice::Unknown(other.code()),
    }
}

/// Receiver loop for one server connection
///
/// Blank lines are skipped. Ends with [`Notice::ConnectionLost`] when the
/// stream closes or fails.
pub async fn receive<R>(
    reader: R,
    identity: String,
    state: watch::Sender<SessionState>,
    notices: mpsc::UnboundedSender<Notice>,
) where
    R: AsyncRead + Unpin,
{
    let mut frames = FramedRead::new(reader, MessageCodec::client());

    while let Some(frame) = frames.next().await {
        let msg = match frame {
            Ok(msg) => msg,
            Err(e) => {
                debug!("Receive failed: {}", e);
                break;
            }
        };

        let mut notice = Notice::Unknown(msg.kind.code());
        state.send_modify(|s| notice = apply(s, &identity, msg));

        if notices.send(notice).is_err() {
            return;
        }
    }

    let _ = notices.send(Notice::ConnectionLost);
}

/// Result of executing one command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// A request went out; the answer will arrive as a notice
    Sent,
    /// Handled locally, nothing was sent
    Local(String),
    /// The user asked to quit
    Exit,
}

/// An open server connection
struct Link {
    writer: FramedWrite<OwnedWriteHalf, MessageCodec>,
    receiver: JoinHandle<()>,
}

/// Command-side half of the client
pub struct ClientDriver {
    state: watch::Receiver<SessionState>,
    link: Option<Link>,
    notice_tx: mpsc::UnboundedSender<Notice>,
    notice_rx: mpsc::UnboundedReceiver<Notice>,
}

impl ClientDriver {
    pub fn new() -> Self {
        let (_, state) = watch::channel(SessionState::default());
        let (notice_tx, notice_rx) = mpsc::unbounded_channel();
        Self {
            state,
            link: None,
            notice_tx,
            notice_rx,
        }
    }

    /// Latest published session state
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Wait for the next notice from the receiver
    pub async fn next_notice(&mut self) -> Option<Notice> {
        self.notice_rx.recv().await
    }

    /// Execute one command against the cached state
    pub async fn execute(&mut self, command: Command) -> Reply {
        let state = self.state();

        match command {
            Command::Login {
                id,
                password,
                host,
                port,
            } => self.login(id, password, &host, port).await,
            Command::Logout => {
                if !state.logged_in {
                    return local("You are not logged in");
                }
                self.send(Message::request(MessageType::Logout, state.identity, ""))
                    .await
            }
            Command::CreateSession(session) => {
                if !state.logged_in {
                    return local("You must be logged in to create a session");
                }
                self.send(Message::request(
                    MessageType::NewSession,
                    state.identity,
                    session,
                ))
                .await
            }
            Command::JoinSession(session) => {
                self.send(Message::request(MessageType::Join, state.identity, session))
                    .await
            }
            Command::LeaveSession => {
                if !state.logged_in {
                    return local("You must be logged in to leave a session");
                }
                if !state.in_session() {
                    return local("You are not in any session");
                }
                self.send(Message::request(
                    MessageType::LeaveSession,
                    state.identity,
                    "",
                ))
                .await
            }
            Command::List => {
                self.send(Message::request(MessageType::Query, state.identity, ""))
                    .await
            }
            Command::Quit => {
                if state.logged_in {
                    let _ = self
                        .send(Message::request(MessageType::Quit, state.identity, ""))
                        .await;
                }
                self.disconnect().await;
                Reply::Exit
            }
            Command::Chat(text) => {
                if !state.logged_in {
                    return local("You must be logged in to send messages");
                }
                if !state.in_session() {
                    return local("You must join a session first");
                }
                self.send(Message::request(MessageType::Chat, state.identity, text))
                    .await
            }
        }
    }

    /// Open a fresh connection and send LOGIN on it
    async fn login(&mut self, id: String, password: String, host: &str, port: u16) -> Reply {
        self.disconnect().await;

        let stream = match TcpStream::connect((host, port)).await {
            Ok(stream) => stream,
            Err(e) => return Reply::Local(format!("Connection failed: {}", e)),
        };
        info!("Connected to {}:{}", host, port);

        let (read_half, write_half) = stream.into_split();
        let (state_tx, state_rx) = watch::channel(SessionState::default());
        self.state = state_rx;

        let receiver = tokio::spawn(receive(
            read_half,
            id.clone(),
            state_tx,
            self.notice_tx.clone(),
        ));
        self.link = Some(Link {
            writer: FramedWrite::new(write_half, MessageCodec::client()),
            receiver,
        });

        self.send(Message::request(MessageType::Login, id, password))
            .await
    }

    async fn send(&mut self, msg: Message) -> Reply {
        let Some(link) = self.link.as_mut() else {
            return local("Not connected to a server");
        };

        match link.writer.send(msg).await {
            Ok(()) => Reply::Sent,
            Err(e) => Reply::Local(format!("Send failed: {}", e)),
        }
    }

    /// Drop the current connection, stopping its receiver first so it does
    /// not report the closure as a loss
    ///
    /// The cached state goes back to logged out: nothing the old server
    /// confirmed holds once its connection is gone.
    async fn disconnect(&mut self) {
        if let Some(link) = self.link.take() {
            link.receiver.abort();
            let _ = link.receiver.await;
            debug!("Dropped server connection");
        }
        self.state = watch::channel(SessionState::default()).1;
    }
}

impl Default for ClientDriver {
    fn default() -> Self {
        Self::new()
    }
}

fn local(text: &str) -> Reply {
    Reply::Local(text.to_string())
}
