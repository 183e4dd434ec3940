//! Server configuration
//!
//! Registry capacities and the static credential table. Both are fixed once
//! the server starts.

use std::path::Path;

use serde::Deserialize;

use crate::error::AppError;

/// Default client registry capacity
pub const DEFAULT_MAX_CLIENTS: usize = 100;
/// Default room registry capacity
pub const DEFAULT_MAX_SESSIONS: usize = 50;
/// Default member capacity of a single room
pub const DEFAULT_MAX_MEMBERS: usize = 100;

/// One (identity, password) pair
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Credential {
    pub id: String,
    pub password: String,
}

/// In-memory credential table
///
/// Passwords are compared verbatim.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    entries: Vec<Credential>,
}

impl CredentialStore {
    pub fn new(entries: Vec<Credential>) -> Self {
        Self { entries }
    }

    /// Parse a JSON array of `{"id": .., "password": ..}` objects
    pub fn from_json_str(json: &str) -> Result<Self, AppError> {
        let entries: Vec<Credential> = serde_json::from_str(json)?;
        Ok(Self::new(entries))
    }

    /// Load the table from a JSON file
    pub fn from_json_file(path: &Path) -> Result<Self, AppError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Check an identity/password pair against the table
    pub fn verify(&self, id: &str, password: &str) -> bool {
        self.entries
            .iter()
            .any(|c| c.id == id && c.password == password)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for CredentialStore {
    fn default() -> Self {
        let entries = [("a", "1"), ("b", "2"), ("c", "3"), ("d", "4")]
            .into_iter()
            .map(|(id, password)| Credential {
                id: id.to_string(),
                password: password.to_string(),
            })
            .collect();
        Self::new(entries)
    }
}

/// Everything the chat actor needs to start
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub max_clients: usize,
    pub max_sessions: usize,
    pub max_members: usize,
    pub credentials: CredentialStore,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_clients: DEFAULT_MAX_CLIENTS,
            max_sessions: DEFAULT_MAX_SESSIONS,
            max_members: DEFAULT_MAX_MEMBERS,
            credentials: CredentialStore::default(),
        }
    }
}
