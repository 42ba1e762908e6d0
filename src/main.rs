//! Deferred request relay.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌───────────────────────── ingress ─────────────────────────┐
//!   Client Request   │  ┌─────────┐  sync   ┌───────────┐                         │
//!   ─────────────────┼─▶│ classify│────────▶│  forward  │─────────────────────────┼──▶ Destination
//!                    │  │ (Prefer)│         └───────────┘                         │
//!                    │  └────┬────┘ deferred ┌───────┐  ┌──────────┐             │
//!   202 Accepted     │       └──────────────▶│ codec │─▶│  queue   │─── append ──┼──▶ Redis Stream
//!   ◀────────────────┼───────────────────────└───────┘  └──────────┘             │        │
//!                    └───────────────────────────────────────────────────────────┘        │
//!                    ┌───────────────────────── worker ──────────────────────────┐        │
//!                    │  receive_next ─▶ decode ─▶ strip Prefer ─▶ replay ─▶ ack  │◀───────┘
//!                    └─────────────────────────────────────┬─────────────────────┘
//!                                                          └──────────────────────────▶ Destination
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use deferred_relay::config::load_or_default;
use deferred_relay::lifecycle::startup::{self, Role};
use deferred_relay::lifecycle::{trigger_on_signal, Shutdown};
use deferred_relay::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "deferred-relay", version, about = "Fire-and-forget HTTP relay")]
struct Cli {
    /// Path to a TOML configuration file. Defaults and environment variables
    /// apply when omitted.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Clone, Copy)]
enum Command {
    /// Run the ingress dispatcher.
    Ingress,
    /// Run the replay worker (pull loops or push receiver).
    Worker,
    /// Run ingress and worker in one process.
    AllInOne,
}

impl From<Command> for Role {
    fn from(command: Command) -> Self {
        match command {
            Command::Ingress => Role::Ingress,
            Command::Worker => Role::Worker,
            Command::AllInOne => Role::AllInOne,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_or_default(cli.config.as_deref())?;

    logging::init_logging(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "deferred-relay starting");

    let role = Role::from(cli.command);
    tracing::info!(
        role = ?role,
        bind_address = %config.listener.bind_address,
        stream = %config.queue.stream,
        backend = ?config.queue.backend,
        size_limit = config.ingress.size_limit,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let shutdown = Arc::new(Shutdown::new());
    trigger_on_signal(shutdown.clone());

    startup::run(role, config, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
