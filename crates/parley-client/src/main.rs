//! Parley client binary.
//!
//! # Usage
//!
//! ```bash
//! # Join the chat (prompts for a nickname)
//! parley chat --server 127.0.0.1:8888
//!
//! # Watch everything involving bob
//! parley monitor --server 127.0.0.1:8888 --nickname bob
//! ```

use clap::{Parser, Subcommand};
use parley_client::{ChatClient, MonitorClient};
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Parley chat client
#[derive(Parser, Debug)]
#[command(name = "parley")]
#[command(about = "Parley chat client and monitor")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    mode: Mode,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Join the chat
    Chat {
        /// Server address
        #[arg(short, long, default_value = "127.0.0.1:8888")]
        server: String,

        /// Nickname to claim (prompted for if omitted or rejected)
        #[arg(short, long)]
        nickname: Option<String>,
    },

    /// Watch chat traffic without taking part
    Monitor {
        /// Server address
        #[arg(short, long, default_value = "127.0.0.1:8888")]
        server: String,

        /// Only show messages sent by or to this nickname
        #[arg(short, long)]
        nickname: Option<String>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    // Stdout belongs to the conversation
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
    let result = runtime.block_on(run(args.mode));

    // A pending stdin read cannot be cancelled; do not wait for it
    runtime.shutdown_background();

    result
}

async fn run(mode: Mode) -> Result<(), Box<dyn std::error::Error>> {
    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => signal.cancel(),
            Err(e) => tracing::warn!("Cannot listen for interrupts: {}", e),
        }
    });

    let input = BufReader::new(tokio::io::stdin());
    let output = tokio::io::stdout();

    match mode {
        Mode::Chat { server, nickname } => {
            let client = ChatClient::connect(&server).await?;
            tracing::info!("Connected to {}", server);
            client.run(input, output, nickname, shutdown).await?;
        },
        Mode::Monitor { server, nickname } => {
            let monitor = MonitorClient::connect(&server, nickname).await?;
            tracing::info!("Monitoring {}", server);
            monitor.run(input, output, shutdown).await?;
        },
    }

    Ok(())
}
