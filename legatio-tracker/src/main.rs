//! legatio-tracker - visa application tracker service
//!
//! Runs the document upload queue and the application progress poller for
//! one application, and serves both over HTTP + SSE.

use anyhow::{Context, Result};
use clap::Parser;
use legatio_common::config::{load_config, resolve_config_path, TomlConfig};
use legatio_common::events::EventBus;
use legatio_common::ApplicationStatus;
use legatio_tracker::models::DocumentRequirements;
use legatio_tracker::services::{
    ApplicationProgressModel, FlagStore, InMemoryBackend, InMemoryFlagStore, QueueConfig,
    SimulatedTransport, StatusPoller, StatusPollerConfig, UploadQueueManager, UploadWorker,
    UploadWorkerConfig,
};
use legatio_tracker::{build_router, AppState};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter};

/// Command-line arguments for legatio-tracker
#[derive(Parser, Debug)]
#[command(name = "legatio-tracker")]
#[command(about = "Visa application upload queue and progress tracker")]
#[command(version)]
struct Args {
    /// Config file (defaults to $LEGATIO_CONFIG, then the platform config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = "LEGATIO_PORT")]
    port: Option<u16>,

    /// Probability that a simulated transfer is rejected
    #[arg(long, default_value_t = 0.1)]
    failure_rate: f64,

    /// Delay between simulated progress reports
    #[arg(long, default_value_t = 250)]
    step_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Subscriber goes in before the config loads so its warnings are kept
    let env_filter = EnvFilter::try_from_default_env().ok();
    let from_env = env_filter.is_some();
    let (filter, filter_handle) =
        reload::Layer::new(env_filter.unwrap_or_else(|| EnvFilter::new("info")));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = resolve_config_path(args.config.as_deref());
    let config = load_config(config_path.as_deref()).context("Failed to load configuration")?;

    // RUST_LOG wins over the configured level
    if !from_env {
        filter_handle
            .modify(|filter| *filter = EnvFilter::new(&config.logging.level))
            .context("Failed to apply configured log level")?;
    }

    let port = args.port.unwrap_or(config.port);
    info!("Starting legatio-tracker on port {}", port);
    info!(
        "Version: {} ({}, {} build {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_PROFILE"),
        env!("BUILD_TIMESTAMP")
    );
    if let Some(path) = &config_path {
        info!("Config: {}", path.display());
    }

    let shutdown = CancellationToken::new();
    let event_bus = EventBus::new(256);
    let flags = open_flag_store(&config).await?;

    // Demo backend: one registered application with the catalog requirements
    let backend = Arc::new(InMemoryBackend::new());
    backend
        .register(&config.application.id, ApplicationStatus::Submitted)
        .await;
    let requirements = DocumentRequirements::for_visa_type(config.application.visa_type);
    info!(
        application_id = %config.application.id,
        visa_type = %config.application.visa_type,
        mandatory = requirements.mandatory.len(),
        "Tracking application"
    );

    let model = ApplicationProgressModel::new(&config.application.id, config.application.visa_type);
    let poller = StatusPoller::new(
        model,
        backend,
        Arc::clone(&flags),
        event_bus.clone(),
        StatusPollerConfig {
            interval: Duration::from_secs(config.polling.interval_secs),
            poll_timeout: config.polling.poll_timeout_secs.map(Duration::from_secs),
        },
    );

    let queue = UploadQueueManager::new(QueueConfig::new(config.uploads.max_concurrent_uploads)?);
    let transport = SimulatedTransport::new(Duration::from_millis(args.step_ms), 10)
        .with_failure_rate(args.failure_rate);
    let (completion_tx, completion_rx) = mpsc::unbounded_channel();
    let (worker, uploads) = UploadWorker::new(
        queue,
        Arc::new(transport),
        event_bus.clone(),
        UploadWorkerConfig {
            transfer_timeout: config.uploads.transfer_timeout_secs.map(Duration::from_secs),
        },
        shutdown.clone(),
    );
    let worker_task = tokio::spawn(worker.with_completion_sink(completion_tx).run());
    info!(
        "Upload worker running (max {} concurrent)",
        config.uploads.max_concurrent_uploads
    );

    let bridge_task = legatio_tracker::event_bridge::spawn_upload_bridge(
        completion_rx,
        poller.clone(),
        shutdown.clone(),
    );
    let ticker = poller.start();

    let state = AppState::new(uploads, poller.clone(), flags, event_bus, shutdown.clone());
    let app = build_router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    // Open SSE connections only close once the token fires, so cancel it
    // before axum waits on them
    let graceful = {
        let poller = poller.clone();
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            poller.stop().await;
            shutdown.cancel();
        }
    };
    axum::serve(listener, app)
        .with_graceful_shutdown(graceful)
        .await
        .context("Server error")?;

    let _ = worker_task.await;
    let _ = bridge_task.await;
    if let Some(ticker) = ticker {
        let _ = ticker.await;
    }

    info!("Server shutdown complete");
    Ok(())
}

/// SQLite when `database_path` is configured, memory otherwise
async fn open_flag_store(config: &TomlConfig) -> Result<Arc<dyn FlagStore>> {
    match &config.database_path {
        Some(path) => {
            info!("Database: {}", path.display());
            let pool = legatio_tracker::db::init_database_pool(path)
                .await
                .context("Failed to open database")?;
            Ok(Arc::new(legatio_tracker::db::SqliteFlagStore::new(pool)))
        }
        None => {
            info!("No database_path configured, flags kept in memory");
            Ok(Arc::new(InMemoryFlagStore::new()))
        }
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
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
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
