//! Standard invariant checks.
//!
//! All of these must hold between ticks. Mid-tick the driver is allowed to
//! carry faulted sessions and pending renames; by the time `tick` returns
//! both have been resolved.

use std::collections::BTreeMap;

use super::{Invariant, InvariantResult, RegistrySnapshot, Violation};

/// No two registered names are equal, ignoring case.
pub struct UniqueNames;

impl Invariant for UniqueNames {
    fn name(&self) -> &'static str {
        "UniqueNames"
    }

    fn check(&self, state: &RegistrySnapshot) -> InvariantResult {
        let mut seen = BTreeMap::new();
        for name in &state.names {
            if let Some(previous) = seen.insert(name.to_lowercase(), name) {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!("name {name:?} registered twice (also as {previous:?})"),
                });
            }
        }
        Ok(())
    }
}

/// The name list and the sessions describe the same set of names.
///
/// Every session's name appears in the list exactly once, and every list
/// entry belongs to some session.
pub struct NamesMatchSessions;

impl Invariant for NamesMatchSessions {
    fn name(&self) -> &'static str {
        "NamesMatchSessions"
    }

    fn check(&self, state: &RegistrySnapshot) -> InvariantResult {
        let mut listed: Vec<&str> = state.names.iter().map(String::as_str).collect();
        let mut held: Vec<&str> = state.sessions.iter().map(|s| s.name.as_str()).collect();
        listed.sort_unstable();
        held.sort_unstable();

        if listed != held {
            return Err(Violation {
                invariant: self.name(),
                message: format!("name list {listed:?} != session names {held:?}"),
            });
        }
        Ok(())
    }
}

/// Between ticks, every session is live and nothing is left pending.
pub struct NoFaultedSessions;

impl Invariant for NoFaultedSessions {
    fn name(&self) -> &'static str {
        "NoFaultedSessions"
    }

    fn check(&self, state: &RegistrySnapshot) -> InvariantResult {
        if let Some(session) = state.sessions.iter().find(|s| !s.live) {
            return Err(Violation {
                invariant: self.name(),
                message: format!("session {} ({}) is faulted but registered", session.id, session.name),
            });
        }
        if !state.faults.is_empty() {
            return Err(Violation {
                invariant: self.name(),
                message: format!("fault set not drained: {:?}", state.faults),
            });
        }
        if state.pending_renames > 0 {
            return Err(Violation {
                invariant: self.name(),
                message: format!("{} renames still pending", state.pending_renames),
            });
        }
        Ok(())
    }
}

/// The guest counter never goes backwards and stays ahead of the session
/// count.
///
/// Each registration consumes at least one guest number, so the counter can
/// never be smaller than the number of live sessions.
pub struct GuestCounterMonotonic;

impl Invariant for GuestCounterMonotonic {
    fn name(&self) -> &'static str {
        "GuestCounterMonotonic"
    }

    fn check(&self, state: &RegistrySnapshot) -> InvariantResult {
        for window in state.guest_counter_history.windows(2) {
            if window[1] < window[0] {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!("guest counter decreased {} → {}", window[0], window[1]),
                });
            }
        }

        if let Some(counter) = state.guest_counter() {
            if counter < state.sessions.len() as u64 {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!("guest counter {counter} behind {} sessions", state.sessions.len()),
                });
            }
        }
        Ok(())
    }
}
