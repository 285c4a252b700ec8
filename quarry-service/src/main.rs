use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

mod api;
mod config;
mod db;
mod error;
mod ingestion;
mod service;

use crate::config::load_config;
use crate::db::{Database, SessionProvider};
use crate::service::{DocumentService, start_ingestion_workers};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    init_logging();

    info!("Starting Quarry service v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config()?;
    info!(
        host = %config.server.host,
        port = config.server.port,
        data_dir = %config.storage.data_dir.display(),
        "Configuration loaded"
    );

    // Ensure data directory exists
    std::fs::create_dir_all(&config.storage.data_dir)?;

    // Initialize database
    let db_path = config.storage.database_path();
    let sessions: Arc<dyn SessionProvider> = Arc::new(Database::open(&db_path)?);
    info!(path = %db_path.display(), "Database initialized");

    let addr = format!("{}:{}", config.server.host, config.server.port);

    // Initialize the service
    let service = Arc::new(DocumentService::new(config, sessions)?);
    service.bootstrap_users()?;

    // Requeue work from a previous run before the workers start
    service.recover_interrupted_jobs()?;
    if let Err(e) = service.sweep_orphaned_uploads() {
        warn!(error = %error::format_error_chain(&e), "Orphaned upload sweep failed");
    }

    let metrics = PrometheusBuilder::new().install_recorder()?;

    let shutdown = CancellationToken::new();
    let workers = start_ingestion_workers(service.clone(), shutdown.clone());

    let app = api::router(service, Some(metrics));

    // Start the server
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Waiting for ingestion workers to finish");
    shutdown.cancel();
    for result in futures::future::join_all(workers).await {
        if let Err(e) = result {
            warn!(error = %e, "Ingestion worker ended abnormally");
        }
    }

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

fn init_logging() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let format = fmt::format()
        .with_target(true)
        .with_thread_ids(true)
        .compact();

    // Use RUST_LOG if set, otherwise default to info level for our crate
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("quarry_service=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().event_format(format))
        .with(filter)
        .init();
}
