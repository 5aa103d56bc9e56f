//! chat-relay
//!
//! A small HTTP relay in front of one streaming LLM API.
//!
//! # Architecture Overview
//!
//! ```text
//!     Browser                 ┌──────────────────────────────────────────┐
//!     ───── POST /chat ──────▶│ http::chat   validate, default model     │
//!                             │      │                                    │
//!                             │      ▼                                    │
//!                             │ upstream::client  POST, spawn read loop ─┼──▶ Model API
//!                             │      │   mpsc(1) chunks + oneshot error   │
//!     ◀──── chunk frames ─────│ Relay body  (owns the CancelHandle)       │
//!                             │                                           │
//!                             │ config · observability · lifecycle        │
//!                             └──────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use chat_relay::config::{load_config, RelayConfig};
use chat_relay::http::HttpServer;
use chat_relay::lifecycle::{signals, Shutdown};
use chat_relay::observability::{logging, metrics};
use chat_relay::upstream::UpstreamClient;

#[derive(Parser)]
#[command(name = "chat-relay")]
#[command(version, about = "Relay chat requests to a streaming LLM API", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address.
    #[arg(short, long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => RelayConfig::default(),
    };
    if let Some(listen) = cli.listen {
        config.listener.bind_address = listen;
    }

    logging::init(&config.observability);
    tracing::info!("chat-relay v{} starting", env!("CARGO_PKG_VERSION"));

    let api_key = config.upstream.load_api_key().map_err(|e| {
        tracing::error!(error = %e, "Missing upstream credential");
        e
    })?;

    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.url,
        default_model = %config.upstream.default_model,
        "Configuration loaded"
    );

    let upstream = UpstreamClient::new(&config.upstream, api_key)?;

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address)
        .await
        .map_err(|e| {
            tracing::error!(address = %config.listener.bind_address, error = %e, "Failed to bind");
            e
        })?;

    let shutdown = Shutdown::new();
    signals::spawn_signal_listener(shutdown.clone());

    let server = HttpServer::new(config, upstream);
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
