//! Interactive client commands
//!
//! One command per input line. Slash words select a command; any other
//! input is a chat line for the current session.

use thiserror::Error;

/// A parsed input line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Login {
        id: String,
        password: String,
        host: String,
        port: u16,
    },
    Logout,
    CreateSession(String),
    JoinSession(String),
    LeaveSession,
    List,
    Quit,
    Chat(String),
}

/// Input that cannot become a command; Display is the text shown to the user
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("Usage: /login <ID> <password> <IP> <port>")]
    LoginUsage,
    #[error("Usage: /createsession <session_id>")]
    CreateSessionUsage,
    #[error("Usage: /joinsession <session_id>")]
    JoinSessionUsage,
    #[error("Unknown command: {0}")]
    Unknown(String),
}

impl Command {
    /// Parse one input line
    ///
    /// Returns `Ok(None)` for blank input. Extra arguments are ignored.
    pub fn parse(input: &str) -> Result<Option<Command>, CommandError> {
        let line = input.trim_end_matches(['\n', '\r']);
        let mut words = line.split_whitespace();
        let Some(first) = words.next() else {
            return Ok(None);
        };

        let command = match first {
            "/login" => {
                let (Some(id), Some(password), Some(host), Some(port)) =
                    (words.next(), words.next(), words.next(), words.next())
                else {
                    return Err(CommandError::LoginUsage);
                };
                let port = port.parse().map_err(|_| CommandError::LoginUsage)?;
                Command::Login {
                    id: id.to_string(),
                    password: password.to_string(),
                    host: host.to_string(),
                    port,
                }
            }
            "/logout" => Command::Logout,
            "/createsession" => words
                .next()
                .map(|s| Command::CreateSession(s.to_string()))
                .ok_or(CommandError::CreateSessionUsage)?,
            "/joinsession" => words
                .next()
                .map(|s| Command::JoinSession(s.to_string()))
                .ok_or(CommandError::JoinSessionUsage)?,
            "/leavesession" => Command::LeaveSession,
            "/list" => Command::List,
            "/quit" => Command::Quit,
            other if other.starts_with('/') => {
                return Err(CommandError::Unknown(other.to_string()));
            }
            _ => Command::Chat(line.to_string()),
        };

        Ok(Some(command))
    }
}
