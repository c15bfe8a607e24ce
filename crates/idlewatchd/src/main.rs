//! idlewatchd - idle shutdown monitor for a game server
//!
//! Wires together:
//! - Configuration loading (environment, optional TOML file)
//! - Connecting to the management API with backoff
//! - The polling monitor and its terminal action
//! - Signal handling and reconnects

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use idlewatch_config::load_config;
use idlewatch_util::{CancelToken, RunId};
use idlewatchd::Watcher;
use std::path::PathBuf;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{Instrument, error, info, info_span};
use tracing_subscriber::EnvFilter;

/// idlewatchd - Stop a game server once it has sat empty long enough
#[derive(Parser, Debug)]
#[command(name = "idlewatchd")]
#[command(about = "Stop a game server once it has sat empty long enough", long_about = None)]
struct Args {
    /// Optional TOML config file; environment variables take precedence
    #[arg(short, long, env = "IDLEWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// Cancel `cancel` on SIGTERM, SIGINT or SIGHUP
fn spawn_signal_listener(cancel: CancelToken) -> Result<()> {
    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;
    let mut sighup = signal(SignalKind::hangup()).context("Failed to create SIGHUP handler")?;

    tokio::spawn(async move {
        let name = tokio::select! {
            _ = sigterm.recv() => "SIGTERM",
            _ = sigint.recv() => "SIGINT",
            _ = sighup.recv() => "SIGHUP",
        };
        info!(signal = name, "Received signal, shutting down gracefully");
        cancel.cancel();
    });

    Ok(())
}

fn init_logging(args: &Args) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    match args.log_format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args);

    let run_id = RunId::new();
    let span = info_span!("idlewatchd", run_id = %run_id);

    async move {
        info!(version = env!("CARGO_PKG_VERSION"), "idlewatchd starting");

        let config = load_config(args.config.as_deref()).map_err(|e| {
            error!(error = %e, "Invalid configuration");
            anyhow::Error::new(e).context("Failed to load configuration")
        })?;

        let cancel = CancelToken::new();
        spawn_signal_listener(cancel.clone())?;

        let watcher = Watcher::new(config, cancel);
        watcher.log_config();
        watcher.run().await
    }
    .instrument(span)
    .await
}
