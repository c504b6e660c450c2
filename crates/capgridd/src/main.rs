//! capgridd — the capgrid daemon.
//!
//! Single binary that assembles the capgrid subsystems:
//! - State store (redb)
//! - Preemption strategies
//! - Deployment scheduler + tenancy
//! - REST API
//!
//! # Usage
//!
//! ```text
//! capgridd serve --config /etc/capgrid/capgrid.toml --port 8080
//! capgridd config --config /etc/capgrid/capgrid.toml
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use capgrid_core::CapgridConfig;
use capgrid_core::config::LoggingConfig;
use capgrid_preemption::StrategySelector;
use capgrid_scheduler::{DeploymentScheduler, SchedulerConfig};
use capgrid_state::StateStore;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,capgridd=debug,capgrid=debug";

#[derive(Parser)]
#[command(name = "capgridd", about = "capgrid scheduling daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the REST API.
    Serve {
        /// TOML configuration file.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Port to listen on (overrides the config file).
        #[arg(long)]
        port: Option<u16>,

        /// Data directory for persistent state (overrides the config file).
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Emit logs as JSON lines.
        #[arg(long)]
        log_json: bool,
    },
    /// Print the effective configuration as TOML.
    Config {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            config,
            port,
            data_dir,
            log_json,
        } => {
            let mut config = load_config(config.as_ref())?;
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(data_dir) = data_dir {
                config.server.data_dir = data_dir;
            }
            config.logging.json |= log_json;

            init_tracing(&config.logging);
            run_serve(config).await
        }
        Command::Config { config } => {
            let config = load_config(config.as_ref())?;
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<CapgridConfig> {
    match path {
        Some(path) => CapgridConfig::from_file(path),
        None => Ok(CapgridConfig::default()),
    }
}

/// `RUST_LOG` wins over the config file, which wins over the default.
fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let directives = logging.filter.as_deref().unwrap_or(DEFAULT_FILTER);
        EnvFilter::try_new(directives).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    });

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run_serve(config: CapgridConfig) -> anyhow::Result<()> {
    info!("capgrid daemon starting");

    // Ensure data directory exists.
    std::fs::create_dir_all(&config.server.data_dir)?;
    let db_path = config.server.data_dir.join("capgrid.redb");

    // ── Initialize subsystems ──────────────────────────────────

    let state = StateStore::open(&db_path)?;
    info!(path = ?db_path, "state store opened");

    let selector = StrategySelector::with_builtin();
    let scheduler_config = SchedulerConfig::from(&config.scheduler);
    info!(
        strategies = ?selector.names(),
        default_strategy = %scheduler_config.default_strategy,
        lock_timeout = ?scheduler_config.lock_timeout,
        "scheduler initialized"
    );
    let scheduler = DeploymentScheduler::new(state, selector, scheduler_config);

    // ── Start API server ───────────────────────────────────────

    let router = capgrid_api::build_router(scheduler);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));

    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on Ctrl-C.
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
            info!("shutdown signal received");
        })
        .await?;

    info!("capgrid daemon stopped");
    Ok(())
}
