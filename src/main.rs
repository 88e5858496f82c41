//! workspace-sync - resilient synchronization core for a hosted workspace API
//!
//! This is the main entry point. Periodicity is owned by the deployment's
//! cron: `tick` runs one scheduling pass and exits, while `serve` runs the
//! HTTP control surface until signalled.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::info;

use workspace_sync::cache::CacheService;
use workspace_sync::config::Config;
use workspace_sync::coordination::{MemoryStateStore, StateStore};
use workspace_sync::database::{SqliteStore, SyncStore};
use workspace_sync::monitor::{LogNotifier, Monitor};
use workspace_sync::remote::{HttpWorkspaceClient, WorkspaceApi};
use workspace_sync::resilience::resilient_client;
use workspace_sync::server::{AppState, Server};
use workspace_sync::sync::{Scheduler, SyncEngine};

/// workspace-sync - resilient synchronization core for a hosted workspace API
#[derive(Parser, Debug)]
#[command(name = "workspace-sync")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, env = "WORKSPACE_SYNC_CONFIG")]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP control surface until interrupted
    Serve,

    /// Run one scheduling pass (intended to be invoked by cron)
    Tick,

    /// Trigger a manual full sync of one database
    Sync {
        /// Local database id
        database_id: String,
    },

    /// Register a remote database for synchronization
    Register {
        /// Identifier of the database on the remote service
        remote_id: String,

        /// Sync interval in seconds
        #[arg(long, default_value_t = 3600)]
        interval: u64,
    },

    /// Print the monitor's health report as JSON
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = load_config(&args)?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    init_tracing(&config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting workspace-sync"
    );

    let state = build_state(&config).await?;

    match args.command {
        Command::Serve => {
            let server = Server::new(config.server.clone(), state);
            info!(
                host = %config.server.host,
                port = %config.server.port,
                "Starting control surface"
            );
            server.run(shutdown_signal()).await?;
            info!("workspace-sync shutdown complete");
        }
        Command::Tick => {
            let reports = state.scheduler.tick(chrono::Utc::now()).await?;
            for report in &reports {
                info!(?report, "Tick result");
            }
        }
        Command::Sync { database_id } => {
            let report = state.scheduler.run_manual(&database_id).await?;
            info!(?report, "Manual sync finished");
        }
        Command::Register {
            remote_id,
            interval,
        } => {
            let database = state.engine.register_database(&remote_id, interval).await?;
            println!("{}", serde_json::to_string_pretty(&database)?);
        }
        Command::Status => {
            let report = state.monitor.evaluate(chrono::Utc::now()).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

/// Load configuration from file or environment
fn load_config(args: &Args) -> anyhow::Result<Config> {
    match &args.config {
        Some(path) => {
            // Use eprintln! since tracing is not yet initialized
            eprintln!("Loading configuration from file: {}", path);
            Config::from_file(path).map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
        }
        None => {
            eprintln!("Loading configuration from environment variables");
            Config::from_env().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
        }
    }
}

/// Initialize tracing/logging
fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&config.logging.level))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    if config.logging.format == "json" {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Wire up the component graph from configuration
async fn build_state(config: &Config) -> anyhow::Result<AppState> {
    let store = Arc::new(SqliteStore::new(&config.database.path).await?);
    info!(path = %config.database.path, "Store initialized");

    // Shared coordination state: in-memory covers a single host; swap in a
    // networked StateStore implementation for multi-process deployments
    let state: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());

    let http = HttpWorkspaceClient::new(config.remote.clone())
        .map_err(|e| anyhow::anyhow!("Failed to build workspace client: {}", e))?;
    let client: Arc<dyn WorkspaceApi> = Arc::new(resilient_client(
        http,
        &config.retry,
        config.breaker.clone(),
        Arc::clone(&state),
    ));

    let cache = Arc::new(CacheService::from_config(&config.cache));
    let engine = Arc::new(SyncEngine::new(
        client,
        Arc::clone(&store) as Arc<dyn SyncStore>,
        cache,
        config.remote.page_size,
    ));

    let scheduler = Arc::new(Scheduler::new(
        Arc::clone(&store) as Arc<dyn SyncStore>,
        Arc::clone(&engine),
        Arc::clone(&state),
        config.scheduler.clone(),
    ));

    let monitor = Arc::new(Monitor::new(
        Arc::clone(&store) as Arc<dyn SyncStore>,
        state,
        Arc::new(LogNotifier),
        config.monitor.clone(),
    ));

    Ok(AppState {
        store: store as Arc<dyn SyncStore>,
        engine,
        scheduler,
        monitor,
    })
}

/// Create a future that resolves when a shutdown signal is received
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
