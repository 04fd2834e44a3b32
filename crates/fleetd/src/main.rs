//! fleetd — the fleet control-plane daemon.
//!
//! Assembles the control plane on the in-memory substrate:
//! - Cluster service (inventory, placement, lifecycle)
//! - Background status reconciler
//!
//! # Usage
//!
//! ```text
//! fleetd run --config fleet.toml --nodes 3 --containers 2
//! fleetd config > fleet.toml
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use fleet_cluster::{ClusterConfig, ClusterService, MemoryProvider};

const DEFAULT_LOG_FILTER: &str = "info,fleetd=debug,fleet=debug";

#[derive(Parser)]
#[command(name = "fleetd", about = "Fleet control-plane daemon")]
struct Cli {
    /// Emit logs as JSON.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the control plane until Ctrl-C.
    Run {
        /// Path to fleet.toml. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Nodes to create and run at startup.
        #[arg(long, default_value = "1")]
        nodes: usize,

        /// Containers to create and run at startup (needs a configured image).
        #[arg(long, default_value = "0")]
        containers: usize,
    },
    /// Print the default configuration as TOML.
    Config,
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::Run {
            config,
            nodes,
            containers,
        } => run(config, nodes, containers).await,
        Command::Config => {
            print!("{}", ClusterConfig::default().to_toml_string()?);
            Ok(())
        }
    }
}

async fn run(config_path: Option<PathBuf>, nodes: usize, containers: usize) -> anyhow::Result<()> {
    let config = match &config_path {
        Some(path) => ClusterConfig::from_file(path)?,
        None => ClusterConfig::default(),
    };
    info!(version = %config.version, config = ?config_path, "fleet daemon starting");

    // ── Initialize control plane ───────────────────────────────

    let provider = Arc::new(MemoryProvider::new());
    let service = Arc::new(ClusterService::new(&config, provider)?);
    info!(policy = service.policy_name(), "cluster service initialized");

    for _ in 0..nodes {
        let node = service.create_node().await?;
        service.run_node(&node).await?;
    }
    for _ in 0..containers {
        let container = service.create_container().await?;
        service.run_container(&container).await?;
    }

    // ── Reconciler ─────────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reconciler = Arc::clone(&service);
    let interval = config.reconcile.interval();
    let reconcile_handle = tokio::spawn(async move {
        reconciler.run_reconciler(interval, shutdown_rx).await;
    });

    println!("{}", serde_json::to_string_pretty(&service.status().await)?);

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);
    if let Err(e) = reconcile_handle.await {
        warn!(error = %e, "reconciler task failed");
    }

    // ── Drain ──────────────────────────────────────────────────

    let grace = service.default_grace_period_ms();
    for node in service.nodes(false).await {
        if let Err(e) = service.kill_node(&node, grace).await {
            warn!(node = %node.name, error = %e, "failed to kill node");
        }
    }

    println!("{}", serde_json::to_string_pretty(&service.status().await)?);
    info!("fleet daemon stopped");
    Ok(())
}
