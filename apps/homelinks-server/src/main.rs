use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod error;
mod handlers;
mod health_probe;
mod router;

use config::ServerConfig;
use health_probe::HealthProbe;
use homelinks_store::{LinkStore, LoadOutcome, WriteLock};

#[derive(Parser)]
#[command(name = "homelinks-server")]
#[command(version, about = "Link launcher backend", long_about = None)]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long, env = "HOMELINKS_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the web server (default)
    Serve,
    /// Report whether the store file is present, missing or corrupt
    Check,
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub store: LinkStore,
    pub probe: HealthProbe,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Result<Self> {
        let probe = HealthProbe::new(Duration::from_secs(config.health_timeout_secs))
            .context("failed to build health probe client")?;
        let store = LinkStore::new(config.data_file.clone(), Arc::new(WriteLock::new()));

        Ok(Self {
            config: Arc::new(config),
            store,
            probe,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = ServerConfig::load(cli.config.as_deref())?;
    let _log_guard = init_tracing(config.log_dir.as_deref());

    match &config.loaded_from {
        Some(path) => tracing::info!("Loaded config from {}", path.display()),
        None => tracing::info!("Loaded config from environment"),
    }

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => run_server(config).await,
        Commands::Check => check_store(&config).await,
    }
}

fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "homelinks.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "homelinks_server=debug,homelinks_store=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    guard
}

async fn run_server(config: ServerConfig) -> Result<()> {
    tracing::info!("Data file: {}", config.data_file.display());
    tracing::info!("Public dir: {}", config.public_dir.display());

    let addr = config.listen;
    let state = AppState::new(config)?;
    let app = router::build_router(state);

    tracing::info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

async fn check_store(config: &ServerConfig) -> Result<()> {
    let store = LinkStore::new(config.data_file.clone(), Arc::new(WriteLock::new()));

    match store.probe().await? {
        LoadOutcome::Loaded(data) => {
            println!("Store {} is readable.", store.path().display());
            println!("  version:      {}", data.version);
            println!("  common items: {}", data.common.items.len());
            println!("  users:        {}", data.users.len());
            Ok(())
        }
        LoadOutcome::Missing => {
            println!(
                "Store {} does not exist yet; defaults will be written on first read.",
                store.path().display()
            );
            Ok(())
        }
        LoadOutcome::Corrupt { raw, reason } => {
            println!(
                "Store {} is corrupt ({} bytes): {}",
                store.path().display(),
                raw.len(),
                reason
            );
            anyhow::bail!("store file is corrupt")
        }
    }
}
