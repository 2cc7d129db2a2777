//! Observable server state for invariant checking.
//!
//! Invariants run against a snapshot rather than the live driver, so a check
//! always sees one consistent point in time.

use parley_server::{Listener, ServerDriver, SessionId};

/// Snapshot of the server's registry and per-pass bookkeeping.
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    /// Registered sessions in accept order.
    pub sessions: Vec<SessionSnapshot>,
    /// Registry name list, in registration order.
    pub names: Vec<String>,
    /// Sessions recorded as faulty and not yet removed.
    pub faults: Vec<SessionId>,
    /// Renames queued and not yet applied.
    pub pending_renames: usize,
    /// Guest counter after every tick so far, oldest first.
    pub guest_counter_history: Vec<u64>,
}

/// Snapshot of one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    /// Session identifier.
    pub id: SessionId,
    /// Display name.
    pub name: String,
    /// False once a transport fault has been recorded.
    pub live: bool,
}

impl RegistrySnapshot {
    /// Create an empty snapshot (no sessions).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Capture the driver's current state.
    ///
    /// `guest_counter_history` holds only the current counter; the driver does
    /// not remember earlier ticks. See [`crate::SimServer::snapshot`] for a
    /// snapshot with history.
    pub fn from_driver<L: Listener>(driver: &ServerDriver<L>) -> Self {
        let registry = driver.registry();
        let sessions = registry
            .iter()
            .map(|s| SessionSnapshot { id: s.id(), name: s.name().to_string(), live: s.is_live() })
            .collect();

        Self {
            sessions,
            names: registry.names().to_vec(),
            faults: driver.faults().iter().collect(),
            pending_renames: driver.pending_renames().len(),
            guest_counter_history: vec![registry.next_guest_number()],
        }
    }

    /// Current guest counter, if known.
    pub fn guest_counter(&self) -> Option<u64> {
        self.guest_counter_history.last().copied()
    }
}
