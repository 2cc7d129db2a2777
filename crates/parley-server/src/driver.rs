//! Server driver.
//!
//! Ties together the listener, the session registry, the command interpreter
//! and the broadcast engine. One call to [`ServerDriver::tick`] is one pass of
//! the server loop:
//!
//! 1. accept every pending connection
//! 2. drain every live session that has complete messages
//! 3. remove sessions that faulted during 1-2
//! 4. apply renames requested during 2
//!
//! Removal and renames wait until the drain is over, so every message in a
//! pass is interpreted and delivered against the registry as it stood when the
//! pass began. The driver never blocks; idling between passes is the
//! runtime's job.

use std::ops::AddAssign;

use parley_proto::payload_text;

use crate::{
    broadcast::{self, FaultSet},
    command::{self, NAME_TAKEN, Outcome, SERVER_FULL},
    registry::{RegistryError, SessionId, SessionRegistry},
    transport::{Connection, Listener},
};

/// Driver configuration
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Maximum concurrent live sessions; further connections are turned
    /// away. `None` accepts everyone.
    pub max_connections: Option<usize>,
    /// Maximum messages read from one session in one pass
    pub max_messages_per_drain: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self { max_connections: None, max_messages_per_drain: 16 }
    }
}

/// A rename accepted by the interpreter, waiting for the end of the pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRename {
    /// Session that asked
    pub session_id: SessionId,
    /// Lower-cased requested name
    pub new_name: String,
}

/// What happened during one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Connections accepted and registered
    pub accepted: usize,
    /// Connections turned away because the server was full
    pub rejected: usize,
    /// Messages read and interpreted
    pub messages: usize,
    /// Faulty sessions removed
    pub removed: usize,
    /// Renames applied
    pub renamed: usize,
    /// Renames dropped at apply time (name claimed earlier, session gone)
    pub renames_dropped: usize,
    /// Writes that failed; each one faulted its recipient
    pub delivery_failures: usize,
}

impl TickReport {
    /// True if the pass did nothing.
    pub fn is_idle(&self) -> bool {
        *self == Self::default()
    }
}

impl AddAssign for TickReport {
    fn add_assign(&mut self, other: Self) {
        self.accepted += other.accepted;
        self.rejected += other.rejected;
        self.messages += other.messages;
        self.removed += other.removed;
        self.renamed += other.renamed;
        self.renames_dropped += other.renames_dropped;
        self.delivery_failures += other.delivery_failures;
    }
}

/// Single-loop chat server driver.
pub struct ServerDriver<L: Listener> {
    /// Source of new connections
    listener: L,
    /// Live sessions and their names
    registry: SessionRegistry<L::Connection>,
    /// Renames collected during the current drain, in request order
    pending_renames: Vec<PendingRename>,
    /// Sessions that faulted during the current pass
    faults: FaultSet,
    /// Driver configuration
    config: DriverConfig,
}

impl<L: Listener> ServerDriver<L> {
    /// Create a new server driver.
    pub fn new(listener: L, config: DriverConfig) -> Self {
        Self {
            listener,
            registry: SessionRegistry::new(),
            pending_renames: Vec::new(),
            faults: FaultSet::new(),
            config,
        }
    }

    /// Run one pass of the server loop.
    pub fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();

        self.accept_pending(&mut report);
        self.drain_sessions(&mut report);
        self.cleanup_faulty(&mut report);
        self.apply_renames(&mut report);

        // Rejection notices sent while applying renames can fault a session.
        if !self.faults.is_empty() {
            self.cleanup_faulty(&mut report);
        }

        if !report.is_idle() {
            tracing::debug!(?report, sessions = self.registry.len(), "tick");
        }

        report
    }

    /// Session registry.
    pub fn registry(&self) -> &SessionRegistry<L::Connection> {
        &self.registry
    }

    /// Renames waiting for the end of the pass. Always empty between ticks.
    pub fn pending_renames(&self) -> &[PendingRename] {
        &self.pending_renames
    }

    /// Sessions awaiting removal. Always empty between ticks.
    pub fn faults(&self) -> &FaultSet {
        &self.faults
    }

    /// Listener.
    pub fn listener(&self) -> &L {
        &self.listener
    }

    /// Listener, mutably.
    pub fn listener_mut(&mut self) -> &mut L {
        &mut self.listener
    }

    /// Driver configuration.
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Accept until the listener reports nobody waiting.
    fn accept_pending(&mut self, report: &mut TickReport) {
        loop {
            match self.listener.poll_accept() {
                Ok(Some(conn)) => self.admit(conn, report),
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("accept failed: {e}");
                    break;
                },
            }
        }
    }

    /// Register a new connection, greet it privately, then announce it.
    fn admit(&mut self, mut conn: L::Connection, report: &mut TickReport) {
        let peer = conn.peer();

        // Sessions faulted earlier in this pass are on their way out.
        let live = self.registry.iter().filter(|s| s.is_live()).count();
        if self.config.max_connections.is_some_and(|max| live >= max) {
            tracing::warn!(%peer, "rejecting connection: {live} sessions already live");
            if let Err(e) = conn.send(SERVER_FULL.as_bytes()) {
                tracing::debug!(%peer, "failed to notify rejected connection: {e}");
            }
            report.rejected += 1;
            return;
        }

        let (id, name) = self.registry.register(conn);
        tracing::info!(session_id = id, %peer, "client {name} joined the server");
        report.accepted += 1;

        let welcome = format!("You joined server as {name}");
        if !broadcast::send_to(&mut self.registry, id, welcome.as_bytes(), &mut self.faults) {
            report.delivery_failures += 1;
        }

        let announcement = format!("Welcome {name} to the server!");
        let delivery = broadcast::broadcast(&mut self.registry, announcement.as_bytes(), &mut self.faults);
        report.delivery_failures += delivery.failed.len();
    }

    /// Drain every live session once, in accept order.
    fn drain_sessions(&mut self, report: &mut TickReport) {
        for id in self.registry.session_ids() {
            self.drain_session(id, report);
        }
    }

    /// Flush queued output, then read and handle up to the per-pass limit.
    fn drain_session(&mut self, id: SessionId, report: &mut TickReport) {
        let Some(session) = self.registry.get_mut(id).filter(|s| s.is_live()) else {
            return;
        };
        if let Err(e) = session.connection_mut().flush() {
            broadcast::fault_session(&mut self.registry, id, &e, &mut self.faults);
            return;
        }

        for _ in 0..self.config.max_messages_per_drain {
            // An earlier message in this loop may have faulted the session.
            let Some(session) = self.registry.get_mut(id).filter(|s| s.is_live()) else {
                return;
            };

            match session.connection_mut().try_read() {
                Ok(Some(payload)) => {
                    report.messages += 1;
                    self.handle_message(id, &payload_text(&payload), report);
                },
                Ok(None) => return,
                Err(e) => {
                    broadcast::fault_session(&mut self.registry, id, &e, &mut self.faults);
                    return;
                },
            }
        }
    }

    /// Interpret one message and carry out its outcome.
    fn handle_message(&mut self, id: SessionId, text: &str, report: &mut TickReport) {
        let outcome = match command::interpret(id, text, &self.registry) {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(session_id = id, "message from unregistered session: {e}");
                return;
            },
        };

        let failed = match outcome {
            Outcome::Broadcast(line) => {
                tracing::debug!(session_id = id, "chat: {line}");
                broadcast::broadcast(&mut self.registry, line.as_bytes(), &mut self.faults).failed.len()
            },
            Outcome::Reply(reply) => {
                tracing::debug!(session_id = id, "command: {text}");
                usize::from(!broadcast::send_to(&mut self.registry, id, reply.as_bytes(), &mut self.faults))
            },
            Outcome::Rename { new_name, notice } => {
                tracing::debug!(session_id = id, "rename requested: {new_name}");
                self.pending_renames.push(PendingRename { session_id: id, new_name });
                broadcast::broadcast(&mut self.registry, notice.as_bytes(), &mut self.faults).failed.len()
            },
        };
        report.delivery_failures += failed;
    }

    /// Remove every session recorded in the fault set.
    fn cleanup_faulty(&mut self, report: &mut TickReport) {
        for id in self.faults.drain() {
            if let Some(session) = self.registry.remove(id) {
                tracing::info!(session_id = id, "removed faulty client {}", session.name());
                report.removed += 1;
            }
        }
    }

    /// Apply pending renames in request order.
    ///
    /// Each rename is re-validated against the registry as it stands, so when
    /// two sessions asked for the same name in one pass the first request
    /// wins and the second is dropped with a private notice.
    fn apply_renames(&mut self, report: &mut TickReport) {
        for PendingRename { session_id, new_name } in std::mem::take(&mut self.pending_renames) {
            let old_name = match self.registry.lookup(session_id) {
                Ok(name) => name.to_owned(),
                Err(_) => {
                    tracing::debug!(session_id, "dropping rename to {new_name}: session gone");
                    report.renames_dropped += 1;
                    continue;
                },
            };

            match self.registry.apply_rename(session_id, &new_name) {
                Ok(()) => {
                    tracing::info!(session_id, "{old_name} is now {new_name}");
                    report.renamed += 1;
                },
                Err(RegistryError::NameTaken(name)) => {
                    tracing::warn!(session_id, "dropping rename of {old_name}: {name} claimed earlier this pass");
                    report.renames_dropped += 1;
                    if !broadcast::send_to(&mut self.registry, session_id, NAME_TAKEN.as_bytes(), &mut self.faults) {
                        report.delivery_failures += 1;
                    }
                },
                Err(e @ RegistryError::NotFound(_)) => {
                    tracing::debug!(session_id, "dropping rename to {new_name}: {e}");
                    report.renames_dropped += 1;
                },
            }
        }
    }
}
