//! nawa402 verification service.
//!
//! # Usage
//!
//! ```bash
//! # Run with default config (config.toml in current directory)
//! cargo run -p nawa402-verifier --release
//!
//! # Run with custom config path and port
//! nawa402-verifier --config /etc/nawa402.toml --port 8080
//!
//! # Configure logging level
//! RUST_LOG=debug nawa402-verifier
//! ```
//!
//! # Environment Variables
//!
//! - `CONFIG` - Path to TOML configuration file (default: `config.toml`)
//! - `HOST` - Override bind address (default: `0.0.0.0`)
//! - `PORT` - Override port (default: `4402`)
//! - `RUST_LOG` - Log level filter (default: `info`)
//!
//! A `.env` file in the working directory is loaded first.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use nawa402::verifier::UncheckedSettlements;
use tracing_subscriber::EnvFilter;

use nawa402_verifier::config::VerifierConfig;
use nawa402_verifier::{VerifierState, app};

/// Command-line arguments. Flags take precedence over the file and `HOST`/`PORT`.
#[derive(Debug, Parser)]
#[command(name = "nawa402-verifier", version, about)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, env = "CONFIG", default_value = "config.toml")]
    config: PathBuf,

    /// Bind address.
    #[arg(long)]
    host: Option<IpAddr>,

    /// Bind port.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        tracing::error!("Verifier failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = VerifierConfig::load_from(&cli.config)?;
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }

    tracing::info!(
        config = %cli.config.display(),
        host = %config.host,
        port = config.port,
        gated = config.policy.is_some(),
        "Loaded configuration"
    );
    if config.recipient.is_none() {
        tracing::warn!("No recipient configured, GET /api/x402 requires ?recipient=");
    }
    tracing::warn!("Settlements are not checked against a ledger; every transaction is accepted");

    let state = VerifierState::new(UncheckedSettlements).with_recipient(config.recipient.clone());
    let router = app(&config, Arc::new(state));

    let addr = SocketAddr::new(config.host, config.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Verifier listening on http://{addr}");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Verifier shut down gracefully");
    Ok(())
}

/// Waits for Ctrl-C or SIGTERM (Unix) to initiate graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(signal) => signal,
                Err(e) => {
                    tracing::warn!("Failed to install SIGTERM handler: {e}");
                    let _ = ctrl_c.await;
                    return;
                }
            };
        tokio::select! {
            _ = ctrl_c => tracing::info!("Received Ctrl-C, shutting down..."),
            _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down..."),
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = ctrl_c.await {
            tracing::warn!("Failed to listen for Ctrl-C: {e}");
        }
        tracing::info!("Received Ctrl-C, shutting down...");
    }
}
