//! YieldLens API server binary.

use anyhow::Context;
use std::path::Path;
use tokio::signal;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};
use yieldlens_core::{DashboardShell, LoggingConfig, ModelGateway, load_config};
use yieldlens_server::{AppState, run, spawn_reaper};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let workspace = std::env::current_dir().ok();
    let config =
        load_config(workspace.as_deref(), None).context("Failed to load configuration")?;

    let _guard = init_tracing(&config.logging)?;

    for warning in config.validate() {
        warn!("{}", warning);
    }

    let gateway = ModelGateway::from_config(&config.llm).context("Failed to configure model gateway")?;
    let state = AppState::new(config.server.clone(), DashboardShell::new(gateway));
    let reaper = spawn_reaper(state.clone());

    run(state, shutdown_signal())
        .await
        .with_context(|| format!("Server error on {}", config.server.bind_addr()))?;

    if let Some(reaper) = reaper {
        reaper.abort();
    }
    info!("Server shutdown complete");
    Ok(())
}

/// Human-readable stderr logging plus optional daily JSON files.
fn init_tracing(logging: &LoggingConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let default_filter = logging.filter.as_deref().unwrap_or("info");
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        );

    let (json_layer, guard) = match &logging.dir {
        Some(dir) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(log_file_appender(dir)?);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(EnvFilter::new("debug"));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    Ok(guard)
}

/// Daily-rolling `yieldlens.log` under `dir`, creating the directory first.
fn log_file_appender(dir: &Path) -> anyhow::Result<RollingFileAppender> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
    Ok(tracing_appender::rolling::daily(dir, "yieldlens.log"))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install terminate handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
}
