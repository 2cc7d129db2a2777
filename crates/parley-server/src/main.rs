//! Parley server binary.
//!
//! # Usage
//!
//! ```bash
//! # Listen on the default chat port
//! parley-server
//!
//! # Listen on localhost only, on another port
//! parley-server --bind 127.0.0.1:55558 --port 6000
//! ```

use std::time::Duration;

use clap::Parser;
use parley_server::{DriverConfig, Server, ServerRuntimeConfig};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Parley chat server
#[derive(Parser, Debug)]
#[command(name = "parley-server")]
#[command(about = "Single-loop TCP chat server")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = "0.0.0.0:55558")]
    bind: String,

    /// Port to listen on (overrides the port in --bind)
    #[arg(short, long)]
    port: Option<u16>,

    /// Maximum concurrent connections (unlimited when omitted)
    #[arg(long)]
    max_connections: Option<usize>,

    /// Pause between loop iterations, in milliseconds
    #[arg(long, default_value = "100")]
    idle_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("Parley server starting");

    let mut config = ServerRuntimeConfig {
        bind_address: args.bind,
        idle_interval: Duration::from_millis(args.idle_ms),
        driver: DriverConfig { max_connections: args.max_connections, ..Default::default() },
        ..Default::default()
    };
    if let Some(port) = args.port {
        config = config.with_port(port)?;
    }

    tracing::info!("Binding to {}", config.bind_address);

    let server = Server::bind(config)?;

    tracing::info!("Server listening on {}", server.local_addr()?);

    server.run().await?;

    Ok(())
}
