//! Invariant checking for deterministic simulation testing.
//!
//! Invariants are properties that must hold after every server tick,
//! whatever the clients did and whichever connections failed. They are
//! checked against a [`RegistrySnapshot`] taken between ticks.
//!
//! # Usage
//!
//! ```ignore
//! let invariants = InvariantRegistry::standard();
//! server.tick();
//! invariants.check_all(&server.snapshot())?;
//! ```

mod checks;
mod snapshot;

pub use checks::{GuestCounterMonotonic, NamesMatchSessions, NoFaultedSessions, UniqueNames};
pub use snapshot::{RegistrySnapshot, SessionSnapshot};

/// Invariant check result.
pub type InvariantResult = Result<(), Violation>;

/// Invariant violation with context.
#[derive(Debug, Clone)]
pub struct Violation {
    /// Name of the violated invariant.
    pub invariant: &'static str,
    /// Description of what went wrong.
    pub message: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.invariant, self.message)
    }
}

impl std::error::Error for Violation {}

/// An invariant that can be checked against server state.
pub trait Invariant: Send + Sync {
    /// Invariant name for error reporting.
    fn name(&self) -> &'static str;

    /// Check the invariant against a snapshot.
    ///
    /// Returns `Ok(())` if the invariant holds, or a [`Violation`]
    /// describing what went wrong.
    fn check(&self, state: &RegistrySnapshot) -> InvariantResult;
}

/// Registry of invariants to check.
///
/// Use [`InvariantRegistry::standard()`] for the registry invariants.
pub struct InvariantRegistry {
    invariants: Vec<Box<dyn Invariant>>,
}

impl Default for InvariantRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InvariantRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self { invariants: Vec::new() }
    }

    /// Create a registry with the standard invariants.
    ///
    /// Includes:
    /// - [`UniqueNames`]: no name is held twice
    /// - [`NamesMatchSessions`]: name list agrees with the sessions
    /// - [`NoFaultedSessions`]: faults and renames resolved by end of tick
    /// - [`GuestCounterMonotonic`]: guest numbers are never reused
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.add(UniqueNames);
        registry.add(NamesMatchSessions);
        registry.add(NoFaultedSessions);
        registry.add(GuestCounterMonotonic);
        registry
    }

    /// Add an invariant to the registry.
    pub fn add<I: Invariant + 'static>(&mut self, invariant: I) {
        self.invariants.push(Box::new(invariant));
    }

    /// Check all invariants against the given state.
    ///
    /// Returns `Ok(())` if all invariants hold, or all violations found.
    pub fn check_all(&self, state: &RegistrySnapshot) -> Result<(), Vec<Violation>> {
        let violations: Vec<_> =
            self.invariants.iter().filter_map(|inv| inv.check(state).err()).collect();

        if violations.is_empty() { Ok(()) } else { Err(violations) }
    }

    /// Check all invariants, panicking with every violation found.
    ///
    /// Use this in tests where you want immediate failure with context.
    #[allow(clippy::panic, reason = "test assertion helper")]
    pub fn assert_all(&self, state: &RegistrySnapshot, context: &str) {
        if let Err(violations) = self.check_all(state) {
            let messages: Vec<_> = violations.iter().map(ToString::to_string).collect();
            panic!("Invariant violation {context}:\n  {}", messages.join("\n  "));
        }
    }

    /// Number of registered invariants.
    pub fn len(&self) -> usize {
        self.invariants.len()
    }

    /// Check if registry is empty.
    pub fn is_empty(&self) -> bool {
        self.invariants.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_registry_has_invariants() {
        let registry = InvariantRegistry::standard();
        assert!(!registry.is_empty());
        assert_eq!(registry.len(), 4);
    }

    #[test]
    fn empty_snapshot_passes_invariants() {
        let registry = InvariantRegistry::standard();
        assert!(registry.check_all(&RegistrySnapshot::empty()).is_ok());
    }

    #[test]
    fn all_violations_are_reported() {
        let state = RegistrySnapshot {
            sessions: vec![SessionSnapshot { id: 0, name: "bob".into(), live: false }],
            names: vec!["bob".into(), "bob".into()],
            ..RegistrySnapshot::default()
        };

        let violations = InvariantRegistry::standard().check_all(&state).unwrap_err();
        let names: Vec<_> = violations.iter().map(|v| v.invariant).collect();
        assert_eq!(names, ["UniqueNames", "NamesMatchSessions", "NoFaultedSessions"]);
        assert!(violations[0].to_string().starts_with("UniqueNames: "));
    }
}
