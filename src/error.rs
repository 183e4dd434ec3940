//! Error types for the chat server and client
//!
//! Defines application-level errors and message send errors.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

use crate::message::MessageType;

/// Application-level errors
///
/// Covers both fatal errors (connection or process termination) and
/// protocol rejections (answered with a negative acknowledgement while the
/// connection stays open).
#[derive(Debug, Error)]
pub enum AppError {
    /// IO error (fatal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Credential file could not be parsed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Channel send error (fatal - internal channel broken)
    #[error("Channel send error")]
    ChannelSend,

    /// Unknown identity or wrong password, or identity already active
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Client registry has no free slot
    #[error("Client registry is full")]
    ServerFull,

    /// This connection already has a logged-in client
    #[error("Connection already logged in")]
    AlreadyLoggedIn,

    /// Request needs a logged-in client
    #[error("Not logged in")]
    NotLoggedIn,

    /// No present session with the given id
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Client is already a member of a session
    #[error("Already in a session")]
    AlreadyInSession,

    /// Session member list is at capacity
    #[error("Session is full")]
    SessionFull,

    /// A session with the given id is already present
    #[error("Session already exists: {0}")]
    SessionExists(String),

    /// Room registry has no free slot
    #[error("Room registry is full")]
    MaxSessions,

    /// Client is not a member of any session
    #[error("Not in a session")]
    NotInSession,

    /// Request type the server does not handle
    #[error("Unknown command: {0}")]
    UnknownCommand(u32),
}

impl AppError {
    /// Negative acknowledgement type used to report this error
    pub fn nak_kind(&self) -> MessageType {
        match self {
            AppError::NotLoggedIn
            | AppError::SessionNotFound(_)
            | AppError::AlreadyInSession
            | AppError::SessionFull
            | AppError::SessionExists(_)
            | AppError::MaxSessions
            | AppError::NotInSession => MessageType::JoinNak,
            _ => MessageType::LoginNak,
        }
    }

    /// Human-readable reason carried in the NAK payload
    pub fn reason(&self) -> &'static str {
        match self {
            AppError::InvalidCredentials => "Invalid credentials",
            AppError::ServerFull => "Server full",
            AppError::AlreadyLoggedIn => "Already logged in",
            AppError::NotLoggedIn => "Not logged in",
            AppError::SessionNotFound(_) => "Session not found",
            AppError::AlreadyInSession => "Already in session",
            AppError::SessionFull => "Session full",
            AppError::SessionExists(_) => "Session already exists",
            AppError::MaxSessions => "Max sessions reached",
            AppError::NotInSession => "Not in any session",
            AppError::UnknownCommand(_) => "Unknown command",
            // Fatal errors are not typically reported on the wire
            _ => "Internal error",
        }
    }
}

/// Message send errors
///
/// Occurs when attempting to send frames through closed channels.
#[derive(Debug, Error)]
pub enum SendError {
    /// The receiving end of the channel has been closed
    #[error("Channel closed")]
    ChannelClosed,
}
