//! Fleet registry API server.
//!
//! This binary provides:
//! - The HTTP API (heartbeat ingestion and liveness-filtered queries)
//! - The background staleness sweeper
//! - Operator commands for initializing and inspecting the node store

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fleet_api::server::{run_with_config, ApiRuntimeConfig};
use fleet_registry::{config::Config, Storage, Sweeper};
use tracing::info;

#[derive(Parser)]
#[command(name = "fleet-api")]
#[command(version, about = "Liveness registry for a fleet of proxy nodes", long_about = None)]
struct Cli {
    /// Path to configuration file (defaults apply when omitted)
    #[arg(short, long)]
    config: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API server and sweeper
    Run,

    /// Create the database and run migrations
    InitDb,

    /// Show node counts
    Status,

    /// Run a single sweep pass and exit
    Sweep,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    init_logging(cli.debug, &config.logging.level, &config.logging.format);

    info!("Fleet registry starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_with_config(ApiRuntimeConfig::from_config(&config)).await?,
        Commands::InitDb => init_database(&config).await?,
        Commands::Status => show_status(&config).await?,
        Commands::Sweep => sweep_once(&config).await?,
    }

    Ok(())
}

fn load_config(path: Option<&str>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::from_file(path).context("Failed to load configuration")?,
        None => Config::default(),
    };
    config.apply_env_overrides()
}

/// Initialize tracing subscriber for logging
fn init_logging(debug: bool, level: &str, format: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let env_filter = if debug {
        EnvFilter::new("fleet_api=debug,fleet_registry=debug,tower_http=debug,sqlx=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "fleet_api={level},fleet_registry={level},tower_http={level}"
            ))
        })
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

async fn open_storage(config: &Config) -> Result<Storage> {
    let storage = Storage::new(
        &config.database.url,
        Some(config.database.max_connections),
        Some(config.database.min_connections),
    )
    .await
    .context("Failed to connect to database")?
    .with_freshness_window(config.registry.freshness_window());

    storage
        .run_migrations()
        .await
        .context("Failed to run migrations")?;

    Ok(storage)
}

async fn init_database(config: &Config) -> Result<()> {
    info!("Initializing database: {}", config.database.url);

    let storage = open_storage(config).await?;
    storage
        .health_check()
        .await
        .context("Database health check failed")?;

    info!("Database initialized successfully!");
    storage.close().await;

    Ok(())
}

async fn show_status(config: &Config) -> Result<()> {
    let storage = open_storage(config).await?;
    let stats = storage.stats().await?;

    info!("Registry status ({})", config.database.url);
    info!("  Nodes: {}", stats.total);
    info!("  Online flag set: {}", stats.online_flagged);
    info!(
        "  Live (seen within {}s): {}",
        config.registry.freshness_window_secs, stats.live
    );
    println!("{}", serde_json::to_string_pretty(&stats)?);

    storage.close().await;

    Ok(())
}

async fn sweep_once(config: &Config) -> Result<()> {
    let storage = open_storage(config).await?;

    let report = Sweeper::new(storage.clone(), config.registry.sweep_interval())
        .with_retention(config.registry.retention())
        .tick()
        .await?;
    info!(
        "Sweep complete: {} node(s) marked offline, {} purged",
        report.marked_offline, report.purged
    );

    storage.close().await;

    Ok(())
}
