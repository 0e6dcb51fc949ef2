//! Bootcamp directory API
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌───────────────────────────────────────────────┐
//!                        │                 BOOTCAMP API                  │
//!                        │                                               │
//!   Client Request       │  ┌──────────┐   ┌──────────────┐   ┌───────┐  │
//!   ─────────────────────┼─▶│  http    │──▶│  middleware  │──▶│  api  │  │
//!                        │  │  server  │   │   pipeline   │   │ mount │  │
//!                        │  └──────────┘   └──────────────┘   └───┬───┘  │
//!                        │                                        │      │
//!                        │                                        ▼      │
//!   Client Response      │  ┌──────────────────────────┐     ┌────────┐  │
//!   ◀────────────────────┼──│ error handler (envelope) │◀────│   db   │  │
//!                        │  └──────────────────────────┘     └────────┘  │
//!                        │                                               │
//!                        │  ┌─────────────────────────────────────────┐  │
//!                        │  │          Cross-Cutting Concerns         │  │
//!                        │  │  config · security · observability      │  │
//!                        │  │  lifecycle (startup, signals, guard)    │  │
//!                        │  └─────────────────────────────────────────┘  │
//!                        └───────────────────────────────────────────────┘
//! ```
//!
//! The process exits 0 after a signal-driven shutdown and 1 when startup
//! fails or a guarded task reports a fatal error.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tokio::net::TcpListener;

use bootcamp_api::http::HttpServer;
use bootcamp_api::lifecycle::{bootstrap, signals, Shutdown};
use bootcamp_api::observability::metrics;

#[derive(Parser)]
#[command(name = "bootcamp-api")]
#[command(about = "Bootcamp directory HTTP API", long_about = None)]
struct Cli {
    /// Environment file loaded before configuration is read
    #[arg(short, long, default_value = "config/config.env")]
    env_file: PathBuf,

    /// Override PORT from the environment
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let startup = match bootstrap(&cli.env_file, cli.port).await {
        Ok(startup) => startup,
        Err(e) => {
            // Logging may not be initialized yet.
            eprintln!("Error: {}", e);
            tracing::error!(error = %e, "Startup failed");
            return ExitCode::FAILURE;
        }
    };
    let config = startup.config;

    if let Some(raw) = &config.observability.metrics_address {
        match raw.parse::<SocketAddr>() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics endpoint");
                }
            }
            Err(_) => {
                tracing::error!(metrics_address = %raw, "Failed to parse metrics address");
            }
        }
    }

    let bind_address = config.server.bind_address();
    let listener = match TcpListener::bind(&bind_address).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(address = %bind_address, error = %e, "Error: failed to bind listener");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(
        "Server running in {} mode on port {}",
        config.server.environment,
        config.server.port
    );

    let shutdown = Shutdown::new();
    tokio::spawn(signals::forward(shutdown.clone()));

    let server = HttpServer::new(config, startup.db, shutdown);
    match server.run(listener).await {
        Ok(reason) => {
            tracing::info!(reason = %reason, "Shutdown complete");
            ExitCode::from(reason.exit_code())
        }
        Err(e) => {
            tracing::error!(error = %e, "Error: server failed");
            ExitCode::FAILURE
        }
    }
}
