//! Fan-out delivery with per-recipient failure isolation.
//!
//! A failed write to one session never stops delivery to the others. The
//! failing session is marked not-live on the spot (so later deliveries and
//! drains in the same pass skip it) and recorded in the [`FaultSet`]; the
//! server loop removes it from the registry once the pass is over.

use std::collections::{BTreeSet, btree_set};

use crate::{
    registry::{SessionId, SessionRegistry},
    transport::{Connection, TransportError},
};

/// Sessions whose transport failed during the current pass.
#[derive(Debug, Default)]
pub struct FaultSet {
    sessions: BTreeSet<SessionId>,
}

impl FaultSet {
    /// Create an empty fault set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a faulty session. Returns `false` if it was already recorded.
    pub fn insert(&mut self, id: SessionId) -> bool {
        self.sessions.insert(id)
    }

    /// Check if a session is recorded.
    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.contains(&id)
    }

    /// Number of recorded sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// True if nothing is recorded.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Recorded sessions in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = SessionId> {
        self.sessions.iter().copied()
    }

    /// Take every recorded session, leaving the set empty.
    pub fn drain(&mut self) -> btree_set::IntoIter<SessionId> {
        std::mem::take(&mut self.sessions).into_iter()
    }
}

/// Result of one delivery call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delivery {
    /// Live sessions a write was attempted on
    pub attempted: usize,
    /// Writes that succeeded
    pub delivered: usize,
    /// Sessions whose write failed (now in the fault set)
    pub failed: Vec<SessionId>,
}

/// Deliver `payload` to every live session in registry order.
///
/// Recipients are attempted in ascending session ID order. A session that
/// fails is quarantined and iteration continues with the next one.
pub fn broadcast<C: Connection>(
    registry: &mut SessionRegistry<C>,
    payload: &[u8],
    faults: &mut FaultSet,
) -> Delivery {
    let mut delivery = Delivery::default();

    for session in registry.iter_mut().filter(|s| s.is_live()) {
        delivery.attempted += 1;
        let id = session.id();

        match session.connection_mut().send(payload) {
            Ok(()) => delivery.delivered += 1,
            Err(e) => {
                quarantine(session.name(), id, &e, faults);
                session.mark_faulted();
                delivery.failed.push(id);
            },
        }
    }

    delivery
}

/// Deliver `payload` to a single session.
///
/// Returns `true` if the write succeeded. Sessions that are missing or
/// already faulted are skipped and count as not delivered.
pub fn send_to<C: Connection>(
    registry: &mut SessionRegistry<C>,
    id: SessionId,
    payload: &[u8],
    faults: &mut FaultSet,
) -> bool {
    let Some(session) = registry.get_mut(id).filter(|s| s.is_live()) else {
        return false;
    };

    match session.connection_mut().send(payload) {
        Ok(()) => true,
        Err(e) => {
            quarantine(session.name(), id, &e, faults);
            session.mark_faulted();
            false
        },
    }
}

/// Record a transport failure found outside a delivery (reads, flushes).
pub(crate) fn fault_session<C>(
    registry: &mut SessionRegistry<C>,
    id: SessionId,
    error: &TransportError,
    faults: &mut FaultSet,
) {
    if let Some(session) = registry.get_mut(id) {
        quarantine(session.name(), id, error, faults);
        session.mark_faulted();
    }
}

fn quarantine(name: &str, id: SessionId, error: &TransportError, faults: &mut FaultSet) {
    if !faults.insert(id) {
        return;
    }

    match error {
        TransportError::Closed => tracing::info!(session_id = id, "client {name} disconnected"),
        _ => tracing::warn!(session_id = id, "dropping client {name}: {error}"),
    }
}
