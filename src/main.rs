//! upstream-sync
//!
//! Keeps nginx upstream configuration in step with running containers.
//!
//! # Architecture Overview
//!
//! ```text
//!   Docker events ──▶ EventWatcher ──┐
//!                                    ├──▶ Reconciler ──▶ UpstreamRegistry ──▶ <dir>/<service>.conf
//!   config file ───▶ ConfigPoller ───┘        │                                    │
//!       (mtime)        (rescan)               ▼                                    ▼
//!                                    matcher + resolver                      nginx reload
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use upstream_sync::config::loader::load_with_mtime;
use upstream_sync::lifecycle::{self, signals, Shutdown};
use upstream_sync::observability::logging::{self, LogFormat};
use upstream_sync::observability::metrics;
use upstream_sync::runtime::DockerRuntime;

#[derive(Parser)]
#[command(name = "upstream-sync")]
#[command(about = "Sync nginx upstreams with running containers", long_about = None)]
struct Cli {
    /// Path to the YAML (or .toml) configuration file
    #[arg(short, long, default_value = "conf/config.yaml")]
    config: PathBuf,

    /// Log level for this crate; RUST_LOG overrides it
    #[arg(long, default_value = "info")]
    log_level: String,

    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,

    /// Serve Prometheus metrics on this address
    #[arg(long)]
    metrics_address: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    logging::init(&cli.log_level, cli.log_format);

    tracing::info!("upstream-sync v{} starting", env!("CARGO_PKG_VERSION"));

    let loaded = load_with_mtime(&cli.config).map_err(|e| {
        tracing::error!(path = %cli.config.display(), error = %e, "Failed to load configuration");
        e
    })?;
    tracing::info!(
        path = %cli.config.display(),
        services = loaded.config.services.len(),
        http_dir = %loaded.config.global.nginx_config_dir,
        stream_dir = %loaded.config.global.stream_config_dir,
        "Configuration loaded"
    );

    if let Some(addr) = cli.metrics_address {
        metrics::init_metrics(addr);
    }

    let runtime = DockerRuntime::connect().map_err(|e| {
        tracing::error!(error = %e, "Failed to connect to the container runtime");
        e
    })?;

    let shutdown = Shutdown::new();
    let running = lifecycle::start(&cli.config, loaded, Arc::new(runtime), &shutdown);

    match signals::wait_for_shutdown_signal().await {
        Ok(signal) => tracing::info!(signal, "Shutdown signal received"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for shutdown signals"),
    }
    shutdown.trigger();
    running.join().await;

    tracing::info!("Shutdown complete");
    Ok(())
}
