//! ---
//! sgrid_section: "01-core-functionality"
//! sgrid_subsection: "binary"
//! sgrid_type: "source"
//! sgrid_scope: "code"
//! sgrid_description: "Binary entrypoint for the S-GRID daemon."
//! sgrid_version: "v0.0.0-prealpha"
//! sgrid_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use s_grid_common::config::AppConfig;
use s_grid_common::logging::init_tracing;
use s_grid_common::time::SystemClock;
use s_grid_core::{spawn_reconciler, ServiceGridOrchestrator, TaskHandlerRegistry};
use s_grid_msg::MemoryTaskBroker;
use s_grid_state::MemoryStateStore;
use tokio::signal;
use tracing::info;

const CONFIG_CANDIDATES: [&str; 2] = ["configs/s-grid.toml", "/etc/s-grid/config.toml"];

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "S-GRID daemon",
    long_about = None
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Run the reconciliation loop")]
    Run,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::load(&[path.as_path()])
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => AppConfig::load(&CONFIG_CANDIDATES)
            .context("failed to load configuration from default candidates")?,
    };
    init_tracing("s-gridd", &config.logging)?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(config).await,
    }
}

async fn run(config: AppConfig) -> Result<()> {
    let store = Arc::new(MemoryStateStore::new());
    let broker = Arc::new(MemoryTaskBroker::new());
    let clock = Arc::new(SystemClock);

    let orchestrator = ServiceGridOrchestrator::new(
        &config.orchestrator,
        &config.health,
        store.clone(),
        broker.clone(),
        broker.clone(),
        clock,
    );
    let runtime = spawn_reconciler(
        orchestrator,
        TaskHandlerRegistry::service_grid(),
        broker,
        store,
        config.orchestrator.tick_interval,
    );
    info!(
        orchestrator = %config.orchestrator.orchestrator_id,
        tick_ms = config.orchestrator.tick_interval.as_millis() as u64,
        "reconciliation loop running"
    );

    signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown signal received");
    runtime.shutdown().await;
    info!("daemon shutdown complete");
    Ok(())
}
