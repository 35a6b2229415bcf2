//! StageOSC - StagelinQ to OSC bridge
//!
//! Listens for DJ equipment for a few seconds, then streams deck track names
//! and beats to an OSC receiver until stopped.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stageosc::bridge::{Bridge, NetworkConnector, Orchestrator};
use stageosc::config::AppConfig;
use stageosc::osc::OscClient;
use stageosc::stagelinq::Listener;

/// StageOSC - forward StagelinQ deck state to OSC
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to an optional YAML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Verbose output (logs every beat frame)
    #[arg(short, long)]
    verbose: bool,

    /// OSC target host, overrides the configuration file
    #[arg(long)]
    osc_host: Option<String>,

    /// OSC target port, overrides the configuration file
    #[arg(long)]
    osc_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();

    init_logging(&args.log_level, args.verbose)?;

    info!("Starting StageOSC v{}...", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args).await?;

    let osc = OscClient::new(&config.osc.host, config.osc.port)
        .await
        .with_context(|| format!("Failed to open OSC output to {}:{}", config.osc.host, config.osc.port))?;

    let listener = Listener::start(config.listener_config())
        .await
        .context("Failed to start StagelinQ discovery")?;

    let bridge = Bridge::new(
        Arc::new(NetworkConnector),
        Arc::new(osc),
        listener.token(),
        config.deck_layout(),
    );
    let orchestrator = Orchestrator::new(config.discovery_window(), config.announce_interval());

    tokio::select! {
        _ = orchestrator.run(listener, bridge) => {},
        _ = shutdown_signal() => {},
    }

    info!("StageOSC shutdown complete");
    Ok(())
}

async fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = match &args.config {
        Some(path) => {
            info!("Configuration file: {}", path);
            AppConfig::load(path).await?
        },
        None => AppConfig::default(),
    };

    if let Some(host) = &args.osc_host {
        config.osc.host = host.clone();
    }
    if let Some(port) = args.osc_port {
        config.osc.port = port;
    }
    config.validate()?;

    Ok(config)
}

fn init_logging(level: &str, verbose: bool) -> Result<()> {
    let filter = if verbose {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .init();

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to install CTRL+C signal handler: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
