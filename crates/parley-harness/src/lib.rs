//! Deterministic simulation harness for the Parley chat server.
//!
//! In-memory implementations of the server's `Listener` and `Connection`
//! traits, so tests can run the real `ServerDriver` without sockets and
//! decide exactly which bytes arrive before which tick. Random write failures
//! come from a seeded RNG, so a failing seed always reproduces.
//!
//! # Invariant Testing
//!
//! The `invariants` module checks properties that must hold after every
//! tick regardless of what clients did. Use [`InvariantRegistry::standard()`]
//! for the registry invariants.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod invariants;
pub mod sim_server;
pub mod sim_transport;

pub use invariants::{
    GuestCounterMonotonic, Invariant, InvariantRegistry, InvariantResult, NamesMatchSessions,
    NoFaultedSessions, RegistrySnapshot, SessionSnapshot, UniqueNames, Violation,
};
pub use sim_server::SimServer;
pub use sim_transport::{ClientId, SimClient, SimConnection, SimListener, SimNetwork};
