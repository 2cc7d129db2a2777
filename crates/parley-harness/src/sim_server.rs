//! Simulation server for deterministic tests.
//!
//! `SimServer` wraps a `ServerDriver` over the in-memory [`SimNetwork`]. Tests
//! drive it explicitly, one tick at a time, and inspect both what clients
//! received and the registry in between.

use parley_server::{DriverConfig, ServerDriver, TickReport};

use crate::{
    invariants::RegistrySnapshot,
    sim_transport::{SimClient, SimListener, SimNetwork},
};

/// Simulation server.
///
/// Records the guest counter after every tick so snapshots can check it
/// never decreases.
pub struct SimServer {
    /// The single-loop driver under test
    driver: ServerDriver<SimListener>,
    /// Network shared with clients
    network: SimNetwork,
    /// Guest counter after each tick
    guest_counter_history: Vec<u64>,
}

impl SimServer {
    /// Create a server on a fresh network seeded with `seed`.
    pub fn new(seed: u64) -> Self {
        Self::with_config(seed, DriverConfig::default())
    }

    /// Create a server with custom driver configuration.
    pub fn with_config(seed: u64, config: DriverConfig) -> Self {
        let network = SimNetwork::new(seed);
        let driver = ServerDriver::new(network.listener(), config);

        Self { driver, network, guest_counter_history: Vec::new() }
    }

    /// Network shared with clients.
    pub fn network(&self) -> &SimNetwork {
        &self.network
    }

    /// Open a new client. It is accepted on the next tick.
    pub fn connect(&self) -> SimClient {
        self.network.connect()
    }

    /// Connect a client and tick once so it is registered.
    pub fn join(&mut self) -> SimClient {
        let client = self.connect();
        self.tick();
        client
    }

    /// Run one loop iteration.
    pub fn tick(&mut self) -> TickReport {
        let report = self.driver.tick();
        self.guest_counter_history.push(self.driver.registry().next_guest_number());
        report
    }

    /// Tick until a pass does nothing, at most `max_ticks` times.
    ///
    /// Returns the combined report of every tick run.
    pub fn run_until_idle(&mut self, max_ticks: usize) -> TickReport {
        let mut total = TickReport::default();
        for _ in 0..max_ticks {
            let report = self.tick();
            if report.is_idle() {
                break;
            }
            total += report;
        }
        total
    }

    /// The driver under test.
    pub fn driver(&self) -> &ServerDriver<SimListener> {
        &self.driver
    }

    /// Registered names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.driver.registry().names().to_vec()
    }

    /// Snapshot of the current state, with the guest counter history.
    pub fn snapshot(&self) -> RegistrySnapshot {
        let mut snapshot = RegistrySnapshot::from_driver(&self.driver);
        snapshot.guest_counter_history.clone_from(&self.guest_counter_history);
        snapshot
    }
}
