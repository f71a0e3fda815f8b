//! AQI Service - HTTP ingestion and WebSocket broadcast.
//!
//! Run with: `cargo run -p aqi-service`

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;

use aqi_service::{AppState, Config, config::default_config_path};

/// AQI Service - HTTP ingestion and WebSocket broadcast for the AQI engine.
#[derive(Parser, Debug)]
#[command(name = "aqi-service")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Bind address (overrides config).
    #[arg(short, long, global = true)]
    bind: Option<String>,

    /// Averaging window in seconds (overrides config).
    #[arg(short, long, global = true)]
    window_secs: Option<u64>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the service in the foreground (default behavior).
    Run,

    /// Load and validate the configuration, then exit.
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    match args.command {
        Some(Command::CheckConfig) => check_config(&args),
        Some(Command::Run) | None => run_server(args).await,
    }
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };

    // Override config with CLI args
    if let Some(bind) = &args.bind {
        config.server.bind = bind.clone();
    }
    if let Some(window_secs) = args.window_secs {
        config.engine.window_secs = window_secs;
    }

    config.validate()?;
    Ok(config)
}

fn check_config(args: &Args) -> anyhow::Result<()> {
    let path = args.config.clone().unwrap_or_else(default_config_path);
    match load_config(args) {
        Ok(config) => {
            println!("Configuration OK ({})", path.display());
            println!("  bind:             {}", config.server.bind);
            println!("  broadcast_buffer: {}", config.server.broadcast_buffer);
            println!("  window_secs:      {}", config.engine.window_secs);
            println!("  recent_limit:     {}", config.storage.recent_limit);
            println!("  prometheus:       {}", config.prometheus.enabled);
            Ok(())
        }
        Err(e) => {
            eprintln!("Invalid configuration ({}):\n{}", path.display(), e);
            Err(e)
        }
    }
}

async fn run_server(args: Args) -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("aqi_service=info".parse()?)
                .add_directive("tower_http=debug".parse()?),
        )
        .init();

    let config = load_config(&args)?;
    let addr: SocketAddr = config.server.bind.parse()?;

    info!(
        window_secs = config.engine.window_secs,
        recent_limit = config.storage.recent_limit,
        "Starting AQI engine"
    );
    let state = AppState::new(config)?;
    let app = aqi_service::app(state);

    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
