//! Session registry for connected clients and their display names.
//!
//! The registry owns every live session and maintains two views of the same
//! data: session ID → session (for delivery and lookup) and an ordered list of
//! registered names (for `/list` and uniqueness checks). Both are updated
//! together by every mutating operation, so no caller can observe one without
//! the other.
//!
//! Names are stored lower-case and compared case-insensitively.

use std::collections::BTreeMap;

use thiserror::Error;

/// Server-assigned session identifier. Ascending in accept order.
pub type SessionId = u64;

/// Prefix for names assigned on accept.
pub const GUEST_PREFIX: &str = "guest";

/// Errors from registry operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Session is not (or no longer) registered.
    #[error("session not found: {0}")]
    NotFound(SessionId),

    /// Another session already holds this name.
    #[error("name already taken: {0}")]
    NameTaken(String),
}

/// One connected client.
#[derive(Debug)]
pub struct Session<C> {
    id: SessionId,
    name: String,
    connection: C,
    live: bool,
}

impl<C> Session<C> {
    /// Session identifier.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Current display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// False once a transport failure has been recorded for this session.
    pub fn is_live(&self) -> bool {
        self.live
    }

    /// Underlying connection.
    pub fn connection(&self) -> &C {
        &self.connection
    }

    /// Underlying connection, mutably.
    pub fn connection_mut(&mut self) -> &mut C {
        &mut self.connection
    }

    /// Stop all further delivery and reads on this session.
    pub(crate) fn mark_faulted(&mut self) {
        self.live = false;
    }
}

/// Registry of connected sessions and their unique display names.
///
/// # Invariants
///
/// - Every entry in the name list belongs to exactly one session, and every
///   session's name is in the list exactly once.
/// - Guest numbers only ever increase; a guest name is never handed out
///   twice.
#[derive(Debug)]
pub struct SessionRegistry<C> {
    /// Session ID → session. Ordered, so iteration follows accept order.
    sessions: BTreeMap<SessionId, Session<C>>,
    /// Registered names in registration order (renames move to the end).
    names: Vec<String>,
    /// Next session ID to hand out
    next_session_id: SessionId,
    /// Next guest number to try
    next_guest: u64,
}

impl<C> Default for SessionRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> SessionRegistry<C> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self { sessions: BTreeMap::new(), names: Vec::new(), next_session_id: 0, next_guest: 0 }
    }

    /// Register a new connection under the next free guest name.
    ///
    /// Never fails. If a client has already claimed the next guest name via
    /// `/setname`, that number is skipped.
    pub fn register(&mut self, connection: C) -> (SessionId, String) {
        let name = loop {
            let candidate = format!("{GUEST_PREFIX}{}", self.next_guest);
            self.next_guest += 1;
            if !self.contains_name(&candidate) {
                break candidate;
            }
        };

        let id = self.next_session_id;
        self.next_session_id += 1;

        self.names.push(name.clone());
        self.sessions.insert(id, Session { id, name: name.clone(), connection, live: true });

        (id, name)
    }

    /// Current display name of a session.
    pub fn lookup(&self, id: SessionId) -> Result<&str, RegistryError> {
        self.sessions.get(&id).map(Session::name).ok_or(RegistryError::NotFound(id))
    }

    /// Check whether any session holds `name`, ignoring case.
    pub fn is_name_taken(&self, name: &str) -> bool {
        self.contains_name(&name.to_lowercase())
    }

    /// Move a session to a new name.
    ///
    /// Removes the old name from the list and appends the new one in a single
    /// step. The name is lower-cased before it is stored.
    ///
    /// # Errors
    ///
    /// - `RegistryError::NotFound` if the session is gone
    /// - `RegistryError::NameTaken` if any session (including this one)
    ///   already holds the name. The registry is unchanged.
    pub fn apply_rename(&mut self, id: SessionId, new_name: &str) -> Result<(), RegistryError> {
        let new_name = new_name.to_lowercase();

        let Some(session) = self.sessions.get_mut(&id) else {
            return Err(RegistryError::NotFound(id));
        };
        if self.names.iter().any(|n| *n == new_name) {
            return Err(RegistryError::NameTaken(new_name));
        }

        let old_name = std::mem::replace(&mut session.name, new_name.clone());

        self.remove_name(&old_name);
        self.names.push(new_name);
        Ok(())
    }

    /// Remove a session and release its name.
    ///
    /// Idempotent: returns `None` if the session was already removed.
    pub fn remove(&mut self, id: SessionId) -> Option<Session<C>> {
        let session = self.sessions.remove(&id)?;
        self.remove_name(&session.name);
        Some(session)
    }

    /// Session by ID. `None` if not registered.
    pub fn get(&self, id: SessionId) -> Option<&Session<C>> {
        self.sessions.get(&id)
    }

    /// Mutable session by ID. `None` if not registered.
    pub fn get_mut(&mut self, id: SessionId) -> Option<&mut Session<C>> {
        self.sessions.get_mut(&id)
    }

    /// Check if a session is registered.
    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id)
    }

    /// All sessions in accept order.
    pub fn iter(&self) -> impl Iterator<Item = &Session<C>> {
        self.sessions.values()
    }

    /// All sessions in accept order, mutably.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Session<C>> {
        self.sessions.values_mut()
    }

    /// Snapshot of registered session IDs in accept order.
    pub fn session_ids(&self) -> Vec<SessionId> {
        self.sessions.keys().copied().collect()
    }

    /// Registered names in registration order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// True if no sessions are registered.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Guest number the next `register` call will try first.
    pub fn next_guest_number(&self) -> u64 {
        self.next_guest
    }

    fn contains_name(&self, lowered: &str) -> bool {
        self.names.iter().any(|n| n == lowered)
    }

    fn remove_name(&mut self, name: &str) {
        if let Some(pos) = self.names.iter().position(|n| n == name) {
            self.names.remove(pos);
        }
    }
}
