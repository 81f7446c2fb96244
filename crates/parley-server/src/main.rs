//! Parley server binary.
//!
//! # Usage
//!
//! ```bash
//! # Listen on the default address
//! parley-server
//!
//! # Public interface, echo broadcasts back to their sender
//! parley-server --bind 0.0.0.0:8888 --echo-to-sender
//! ```

use std::time::Duration;

use clap::Parser;
use parley_server::{DriverConfig, Server, ServerRuntimeConfig};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Parley chat server
#[derive(Parser, Debug)]
#[command(name = "parley-server")]
#[command(about = "Parley chat and monitor server")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = "127.0.0.1:8888")]
    bind: String,

    /// Maximum concurrent connections
    #[arg(long, default_value = "1024")]
    max_connections: usize,

    /// Maximum nickname length in bytes
    #[arg(long, default_value = "32")]
    max_nickname_len: usize,

    /// Deliver broadcasts back to their sender
    #[arg(long)]
    echo_to_sender: bool,

    /// Do not send member joined/left notices
    #[arg(long)]
    quiet_membership: bool,

    /// Accept SET_NICKNAME as the first frame without a prior CONNECT
    #[arg(long)]
    lenient_connect: bool,

    /// Seconds a new connection may stay silent before it is closed
    #[arg(long, default_value = "30")]
    handshake_timeout_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("Parley server starting");
    tracing::info!("Binding to {}", args.bind);

    let config = ServerRuntimeConfig {
        bind_address: args.bind,
        driver: DriverConfig {
            max_connections: args.max_connections,
            max_nickname_len: args.max_nickname_len,
            echo_to_sender: args.echo_to_sender,
            announce_membership: !args.quiet_membership,
            lenient_connect: args.lenient_connect,
            handshake_timeout: Duration::from_secs(args.handshake_timeout_secs),
        },
        ..Default::default()
    };

    let server = Server::bind(config).await?;

    tracing::info!("Server listening on {}", server.local_addr()?);

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Interrupt received");
                signal.cancel();
            },
            Err(e) => tracing::warn!("Cannot listen for interrupts: {}", e),
        }
    });

    server.run(shutdown).await?;

    Ok(())
}
