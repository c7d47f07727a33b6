//! Bare tunnel server.
//!
//! # Architecture Overview
//!
//! ```text
//!                          ┌──────────────────────────────────────────────────┐
//!                          │                  BARE TUNNEL                     │
//!                          │                                                  │
//!   Browser request        │  ┌─────────┐    ┌─────────┐    ┌──────────────┐  │
//!   ───────────────────────┼─▶│   net   │───▶│  http   │───▶│   routing    │  │
//!                          │  │listener │    │ server  │    │ (mount dir)  │  │
//!                          │  └─────────┘    └─────────┘    └──────┬───────┘  │
//!                          │                                       │          │
//!                          │               ┌───────────────────────┼────────┐ │
//!                          │               ▼                       ▼        ▼ │
//!                          │        ┌────────────┐        ┌──────────┐ ┌─────┐│
//!                          │        │ tunnel     │        │ tunnel   │ │meta ││
//!                          │        │ http       │        │ websocket│─▶store││
//!                          │        └─────┬──────┘        └────┬─────┘ └─────┘│
//!                          │              │ bare codec         │ relay        │
//!   Envelope / 101         │              ▼                    ▼              │
//!   ◀──────────────────────┼──────── outbound client (http/https) ──────────┼──▶ Remote
//!                          └──────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use bare_tunnel::config::{load_config, ConfigOverrides};
use bare_tunnel::lifecycle;
use bare_tunnel::observability::logging;

#[derive(Parser)]
#[command(name = "bare-tunnel")]
#[command(about = "Bare protocol tunnelling server", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address, overriding the file.
    #[arg(short, long)]
    bind: Option<String>,

    /// Mount directory, overriding the file.
    #[arg(short, long)]
    directory: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let overrides = ConfigOverrides {
        bind: cli.bind,
        directory: cli.directory,
        ..ConfigOverrides::from_env()
    };
    let config = load_config(cli.config.as_deref(), &overrides)?;

    logging::init_logging(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "bare-tunnel starting");

    lifecycle::run(config).await?;
    Ok(())
}
