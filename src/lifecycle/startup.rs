//! Startup orchestration.
//!
//! # Responsibilities
//! - Parse command-line arguments
//! - Load and validate configuration
//! - Initialize logging and metrics
//! - Bind the listener, start reload triggers, serve until shutdown
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - Listeners start last (traffic only when ready)

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use clap::Parser;
use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::loader::{apply_env_overrides, load_config, ConfigError};
use crate::config::validation::validate_config;
use crate::config::watcher::ConfigWatcher;
use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::http::HttpServer;
use crate::lifecycle::signals::{spawn_reload_listener, spawn_shutdown_listener};
use crate::lifecycle::Shutdown;
use crate::observability::logging::init_logging;
use crate::observability::metrics::init_metrics;

#[derive(Parser, Debug)]
#[command(name = "edge-gateway", version, about = "HTTP edge gateway")]
pub struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "gateway.toml")]
    pub config: PathBuf,

    /// Validate the configuration and exit.
    #[arg(long)]
    pub check: bool,

    /// Do not watch the configuration file for changes.
    #[arg(long)]
    pub no_watch: bool,
}

#[derive(Error, Debug)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to initialize logging: {0}")]
    Logging(#[from] tracing_subscriber::util::TryInitError),

    #[error("failed to build gateway: {0}")]
    Gateway(#[from] GatewayError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Load the config file, or defaults plus environment overrides when the
/// file does not exist.
pub fn resolve_config(path: &Path) -> Result<(GatewayConfig, bool), ConfigError> {
    if path.exists() {
        return Ok((load_config(path)?, true));
    }
    let mut config = GatewayConfig::default();
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok((config, false))
}

pub async fn run(args: Args) -> Result<(), StartupError> {
    let (config, from_file) = resolve_config(&args.config)?;

    if args.check {
        println!(
            "{}: configuration OK ({} routes)",
            args.config.display(),
            config.routes.len()
        );
        return Ok(());
    }

    init_logging(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "edge-gateway starting");
    if !from_file {
        tracing::warn!(path = ?args.config, "Config file not found, using defaults");
    }

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => {
                if let Err(e) = init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to initialize metrics, continuing without metrics");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    tracing::info!(
        bind_address = %config.listener.bind_address,
        routes = config.routes.len(),
        rate_limit = config.rate_limit.limit,
        window_secs = config.rate_limit.window_secs,
        "Configuration loaded"
    );

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let server = HttpServer::new(config)?;

    let (watcher, config_updates) = ConfigWatcher::new(&args.config);
    let reload_tx = watcher.sender();
    let _watch_guard = if from_file && !args.no_watch {
        match watcher.run() {
            Ok(guard) => Some(guard),
            Err(e) => {
                tracing::warn!(error = %e, "Config watcher unavailable, hot reload via SIGHUP only");
                None
            }
        }
    } else {
        None
    };
    if from_file {
        spawn_reload_listener(args.config.clone(), reload_tx);
    }

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    spawn_shutdown_listener(shutdown);

    server.run(listener, config_updates, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
