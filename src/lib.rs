//! Line-Oriented Chat Server and Client Library
//!
//! A TCP chat service where clients log in against a static credential
//! table, create or join named sessions, and chat with the other members.
//! Every message is one `type:size:source:data` line.
//!
//! # Features
//! - Login / logout against an in-memory credential table
//! - Session creation, joining and leaving, with automatic deletion of
//!   empty sessions
//! - Chat relay to every member of the sender's session
//! - Server status listing (online users and sessions)
//! - Interactive client driver with a receiver-published state cache
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `ChatServer` is the single owner of both registries
//! - Each connection has a `handler` task that decodes lines into
//!   `ServerCommand`s and writes the actor's responses back
//! - No locks needed - all registry access goes through message passing
//!
//! # Example
//! ```ignore
//! use tokio::net::TcpListener;
//! use textchat::{serve, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let listener = TcpListener::bind("0.0.0.0:5000").await.unwrap();
//!     serve(listener, ServerConfig::default()).await;
//! }
//! ```

pub mod broadcast;
pub mod client;
pub mod codec;
pub mod command;
pub mod config;
pub mod driver;
pub mod error;
pub mod handler;
pub mod listener;
pub mod message;
pub mod room;
pub mod server;
pub mod types;

// Re-export main types for convenience
pub use broadcast::broadcast;
pub use client::{ClientRecord, ClientRegistry, Connection};
pub use codec::MessageCodec;
pub use command::{Command, CommandError};
pub use config::{Credential, CredentialStore, ServerConfig};
pub use driver::{ClientDriver, Notice, Reply, SessionState};
pub use error::{AppError, SendError};
pub use handler::handle_connection;
pub use listener::serve;
pub use message::{Message, MessageType};
pub use room::{Departure, RoomRecord, RoomRegistry};
pub use server::{ChatServer, ServerCommand};
pub use types::{ConnectionId, SlotId};
