//! stats-monitor - continuous resource telemetry for one container
//!
//! Connects to the Docker Engine, streams per-tick stats for the target
//! container and appends derived metrics (CPU %, memory %, network
//! counters) to a semicolon-delimited dataset file.

use anyhow::{Context, Result};
use clap::Parser;
use monitor_lib::{DockerStatsSource, Monitor, MonitorConfig, ReconnectConfig, SourceConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;

/// Records per-tick container resource metrics to a dataset file
#[derive(Parser)]
#[command(name = "stats-monitor")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Target container id or name
    #[arg(long, short)]
    pub container: String,

    /// Dataset file path (defaults to <container>.csv)
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    /// Docker Engine endpoint (overrides MONITOR_DOCKER_HOST and
    /// DOCKER_HOST)
    #[arg(long)]
    pub docker_host: Option<String>,
}

fn default_output(container: &str) -> PathBuf {
    PathBuf::from(format!("{container}.csv"))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let settings = config::Settings::load()?;

    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| default_output(&cli.container));
    let endpoint = cli
        .docker_host
        .clone()
        .unwrap_or_else(|| settings.docker_host.clone());

    info!(
        container_id = %cli.container,
        endpoint = %endpoint,
        output = %output.display(),
        "Starting stats-monitor"
    );

    let source = DockerStatsSource::new(SourceConfig {
        endpoint,
        connect_timeout: Duration::from_secs(settings.connect_timeout_secs),
    })?;

    let monitor_config = MonitorConfig {
        write_retries: settings.write_retries,
        reconnect: ReconnectConfig {
            initial_backoff: Duration::from_millis(settings.reconnect_initial_backoff_ms),
            max_backoff: Duration::from_millis(settings.reconnect_max_backoff_ms),
            max_attempts: settings.reconnect_attempts,
        },
        ..MonitorConfig::new(cli.container.clone(), output)
    };

    let mut monitor = Monitor::new(Arc::new(source), monitor_config);
    if let Err(e) = monitor.connect().await {
        error!(container_id = %cli.container, error = %e, "Cannot start monitoring");
        return Err(e).with_context(|| format!("cannot monitor container {}", cli.container));
    }

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let mut worker = monitor.start(shutdown_rx);

    let rows = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupt received, shutting down");
            let _ = shutdown_tx.send(());
            worker.await.context("monitor task panicked")??
        }
        finished = &mut worker => finished.context("monitor task panicked")??,
    };

    info!(rows, "Shutdown complete");
    Ok(())
}
