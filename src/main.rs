//! Collaborative room relay.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client ──POST /room──▶ ┌──────────┐    ┌───────────┐
//!                            │   http   │───▶│  routing  │──▶ directory (mint id)
//!     Client ──GET /room/x─▶ │  server  │    └─────┬─────┘
//!                            └──────────┘          │
//!                                                  ▼
//!                                           ┌─────────────┐
//!                                           │ room actor  │──▶ relay to other sockets
//!                                           │  + engine   │
//!                                           └─────────────┘
//!
//!     Cross-cutting: config (+ hot reload), security (origin policy),
//!                    observability, lifecycle
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use collab_relay::config::ConfigWatcher;
use collab_relay::lifecycle::{resolve_config, spawn_signal_handler};
use collab_relay::observability::{logging, metrics};
use collab_relay::{HttpServer, Shutdown};

#[derive(Parser)]
#[command(name = "collab-relay")]
#[command(about = "Relay messages between members of collaborative rooms", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file. Watched for changes.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = resolve_config(cli.config.as_deref(), cli.bind.as_deref())?;
    logging::init_logging(&config.observability.log_level);

    tracing::info!("collab-relay v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        request_timeout_secs = config.timeouts.request_secs,
        allowed_origins = config.cors.allowed_origins.len(),
        hibernate_after_secs = config.rooms.hibernate_after_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    // Keep the watcher alive for the lifetime of the server.
    let (_watcher, config_updates) = match &cli.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            match watcher.run() {
                Ok(handle) => (Some(handle), updates),
                Err(e) => {
                    tracing::warn!(error = %e, "Config hot reload disabled");
                    (None, updates)
                }
            }
        }
        None => (None, mpsc::unbounded_channel().1),
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    spawn_signal_handler(shutdown.clone());

    let server = HttpServer::new(config);
    server.run(listener, config_updates, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
