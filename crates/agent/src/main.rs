//! Fleet node agent: keeps this node registered as live with the fleet registry.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fleet_agent::{run_heartbeat_loop, AgentConfig, HeartbeatSender, StaticMetadataProvider};
use tokio::sync::watch;
use tracing::info;

#[derive(Parser)]
#[command(name = "fleet-agent")]
#[command(version, about = "Heartbeat agent for fleet proxy nodes", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "agent.toml")]
    config: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Send heartbeats until interrupted
    Run,

    /// Send a single heartbeat and exit
    Once,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AgentConfig::from_file(&cli.config).context("Failed to load configuration")?;
    init_logging(cli.debug, &config.logging.level, &config.logging.format);

    info!("Fleet agent starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let provider = StaticMetadataProvider::new(config.node.clone());
    let sender = HeartbeatSender::new(config.heartbeat_url(), config.timeout())?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            tokio::spawn(async move {
                shutdown_signal().await;
                let _ = shutdown_tx.send(true);
            });

            run_heartbeat_loop(&provider, &sender, config.interval(), shutdown_rx).await;
        }
        Commands::Once => {
            sender.send(&config.node).await?;
            info!("Heartbeat sent successfully");
        }
    }

    Ok(())
}

/// Initialize tracing subscriber for logging
fn init_logging(debug: bool, level: &str, format: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let env_filter = if debug {
        EnvFilter::new("fleet_agent=debug,reqwest=debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("fleet_agent={level}")))
    };

    let registry = tracing_subscriber::registry().with(env_filter);
    if format == "json" {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_line_number(true))
            .init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", err);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!("Failed to install SIGTERM handler: {}", err);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
