//! Parley chat server.
//!
//! A connection-multiplexing text chat server driven by a single loop: it
//! accepts clients, hands each a guest name, broadcasts their chat lines to
//! everyone, and answers slash commands (`/help`, `/list`, `/setname`).
//!
//! # Architecture
//!
//! All server state is owned by one [`ServerDriver`] and mutated only from
//! [`ServerDriver::tick`], which is synchronous and never blocks: accepts and
//! reads are polled through the [`Listener`] and [`Connection`] traits.
//! [`Server`] is the production runtime that binds a [`TcpTransport`] and
//! calls `tick` on an idle interval from a Tokio task until shutdown.
//!
//! # Components
//!
//! - [`SessionRegistry`]: sessions and their unique display names
//! - [`command`]: parses a message into chat or a command outcome
//! - [`broadcast`]: fan-out with per-recipient failure isolation
//! - [`ServerDriver`]: one pass of the server loop
//! - [`Server`]: production runtime over TCP

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod broadcast;
pub mod command;
mod driver;
mod error;
mod registry;
mod transport;

use std::{net::SocketAddr, time::Duration};

pub use broadcast::{Delivery, FaultSet};
pub use command::{Command, Outcome};
pub use driver::{DriverConfig, PendingRename, ServerDriver, TickReport};
pub use error::ServerError;
pub use registry::{GUEST_PREFIX, RegistryError, Session, SessionId, SessionRegistry};
pub use transport::{Connection, Listener, TcpConnection, TcpTransport, TransportError};

/// Server configuration for the production runtime.
#[derive(Debug, Clone)]
pub struct ServerRuntimeConfig {
    /// Address to bind to (e.g., "0.0.0.0:55558")
    pub bind_address: String,
    /// Pause between loop iterations
    pub idle_interval: Duration,
    /// Unsent bytes a connection may queue before it is dropped as a slow
    /// consumer
    pub max_outbound_bytes: usize,
    /// Driver configuration (limits)
    pub driver: DriverConfig,
}

impl Default for ServerRuntimeConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:55558".to_string(),
            idle_interval: Duration::from_millis(100),
            max_outbound_bytes: 1024 * 1024,
            driver: DriverConfig::default(),
        }
    }
}

impl ServerRuntimeConfig {
    /// Replace the port of `bind_address`, keeping its host.
    pub fn with_port(mut self, port: u16) -> Result<Self, ServerError> {
        let mut addr: SocketAddr = self.bind_address.parse().map_err(|e| {
            ServerError::Config(format!("invalid bind address '{}': {e}", self.bind_address))
        })?;
        addr.set_port(port);
        self.bind_address = addr.to_string();
        Ok(self)
    }
}

/// Production Parley server.
///
/// Wraps `ServerDriver` with a non-blocking TCP listener.
pub struct Server {
    /// The single-loop driver
    driver: ServerDriver<TcpTransport>,
    /// Pause between loop iterations
    idle_interval: Duration,
}

impl Server {
    /// Create and bind a new server.
    pub fn bind(config: ServerRuntimeConfig) -> Result<Self, ServerError> {
        let transport = TcpTransport::bind(&config.bind_address, config.max_outbound_bytes)?;
        let driver = ServerDriver::new(transport, config.driver);

        Ok(Self { driver, idle_interval: config.idle_interval })
    }

    /// Local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.driver.listener().local_addr()
    }

    /// Run a single loop iteration without idling.
    pub fn tick(&mut self) -> TickReport {
        self.driver.tick()
    }

    /// The underlying driver.
    pub fn driver(&self) -> &ServerDriver<TcpTransport> {
        &self.driver
    }

    /// Run the server until Ctrl-C.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("failed to listen for shutdown signal: {e}");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Run the server until `shutdown` completes.
    ///
    /// Each iteration runs one tick, then idles for the configured interval.
    /// Shutdown is checked while idling, so an in-progress tick always
    /// completes.
    pub async fn run_until<F>(mut self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        tracing::info!("Server starting on {}", self.local_addr()?);

        tokio::pin!(shutdown);

        loop {
            self.driver.tick();

            tokio::select! {
                () = &mut shutdown => break,
                () = tokio::time::sleep(self.idle_interval) => {},
            }
        }

        tracing::info!(sessions = self.driver.registry().len(), "Server shutting down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_listens_on_chat_port() {
        let config = ServerRuntimeConfig::default();
        assert_eq!(config.bind_address, "0.0.0.0:55558");
        assert_eq!(config.idle_interval, Duration::from_millis(100));
        assert_eq!(config.driver.max_connections, None);
    }

    #[test]
    fn with_port_keeps_host() {
        let config = ServerRuntimeConfig { bind_address: "127.0.0.1:1".into(), ..Default::default() };
        let config = config.with_port(9000).unwrap();
        assert_eq!(config.bind_address, "127.0.0.1:9000");
    }

    #[test]
    fn with_port_rejects_bad_address() {
        let config = ServerRuntimeConfig { bind_address: "nowhere".into(), ..Default::default() };
        assert!(matches!(config.with_port(9000), Err(ServerError::Config(_))));
    }

    #[test]
    fn bind_reports_local_addr() {
        let config = ServerRuntimeConfig { bind_address: "127.0.0.1:0".into(), ..Default::default() };
        let server = Server::bind(config).unwrap();
        assert_ne!(server.local_addr().unwrap().port(), 0);
        assert!(server.driver().registry().is_empty());
    }
}
