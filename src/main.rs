//! Roomcast Server
//!
//! Run with: cargo run -- serve
//!
//! # Configuration
//!
//! Settings come from a TOML file (`--config`, or the first of
//! `~/.config/roomcast/config.toml`, `/etc/roomcast/config.toml`,
//! `./config.toml`), then environment variables, then command-line flags.
//! A `.env` file in the working directory is loaded first if present.
//! `RUST_LOG` takes precedence over the configured log level.

use anyhow::Context;
use clap::{Parser, Subcommand};
use roomcast::api::{serve, AppState};
use roomcast::config::{generate_default_config, Config, LoggingConfig};
use roomcast::history::{publisher_from_config, HistorySink};
use roomcast::identity::HttpIdentityValidator;
use roomcast::websocket::BroadcastHub;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Upper bound on flushing queued history records at shutdown
const HISTORY_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "roomcast")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Real-time room broadcast hub")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to a TOML config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the WebSocket server
    Serve {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Print a default config file
    InitConfig {
        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Commands::InitConfig { output } => init_config(output),
        Commands::Serve { host, port } => {
            let mut config = match &cli.config {
                Some(path) => Config::load_with_env(path)
                    .with_context(|| format!("loading {}", path.display()))?,
                None => Config::load_default(),
            };
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }

            init_logging(&config.logging);
            run(config).await
        }
    }
}

fn init_config(output: Option<PathBuf>) -> anyhow::Result<()> {
    let content = generate_default_config();
    match output {
        Some(path) => {
            std::fs::write(&path, content)
                .with_context(|| format!("writing {}", path.display()))?;
            println!("Wrote default config to {}", path.display());
        }
        None => print!("{}", content),
    }
    Ok(())
}

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("roomcast={},tower_http=info", config.level))
    });

    let registry = tracing_subscriber::registry().with(filter);
    if config.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    tracing::info!("Starting Roomcast v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Identity backend: {}", config.identity.base_url);

    let validator = HttpIdentityValidator::new(config.identity.client_config())
        .context("building identity client")?;

    let publisher = publisher_from_config(&config.history)
        .await
        .context("opening history backend")?;
    let (history, history_task) = HistorySink::spawn(publisher, config.history.queue_capacity);

    let hub = Arc::new(BroadcastHub::new(
        config.hub_config(),
        Arc::new(validator),
        history,
    ));

    serve(AppState::new(Arc::clone(&hub)), &config.server).await?;

    // The hub owns the last sink handle; dropping it lets the sink drain.
    drop(hub);
    match tokio::time::timeout(HISTORY_DRAIN_TIMEOUT, history_task).await {
        Ok(_) => tracing::info!("History flushed"),
        Err(_) => tracing::warn!("Timed out flushing history, some records may be lost"),
    }

    tracing::info!("Roomcast stopped");
    Ok(())
}
