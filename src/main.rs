use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use clap::Parser;
use tokio::signal;
use tracing::info;

use quillgate::config::QuillgateConfig;
use quillgate::http::{app_router, AppState, HttpServer};
use quillgate::logging;
use quillgate::throttle::{MaintenanceHandle, PolicyRegistry, Throttle};

/// Request throttling service for the journaling reminder application.
#[derive(Parser, Debug)]
#[command(name = "quillgate", version, about)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long, env = "QUILLGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address, overriding the configuration
    #[arg(short, long)]
    bind: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = QuillgateConfig::load(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        config.server.bind_addr = bind;
    }

    logging::init(&config.logging);

    info!("Starting Quillgate");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(bind_addr = %config.server.bind_addr, "Configuration loaded");

    // Load policies: built-in, then the policy file, then inline overrides
    let policies = Arc::new(PolicyRegistry::new(config.throttle.policy_table()?));

    let throttle = Arc::new(Throttle::new());
    info!("Throttle initialized");

    let mut maintenance = MaintenanceHandle::new();
    maintenance.spawn_sweeper(Arc::clone(&throttle), config.throttle.sweep_interval());
    if let (Some(path), Some(interval)) = (
        config.throttle.policies_path.as_ref(),
        config.throttle.reload_interval(),
    ) {
        maintenance.spawn_policy_reloader(
            Arc::clone(&policies),
            PathBuf::from(path),
            config.throttle.overrides(),
            interval,
        );
    }

    let state = AppState::new(
        throttle,
        policies,
        config.server.trust_forwarded_headers,
    );
    let router = app_router(state)?;

    HttpServer::new(config.server.bind_addr, router)
        .serve_with_shutdown(shutdown_signal())
        .await?;

    maintenance.shutdown().await;

    info!("Quillgate stopped");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
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
