mod api;
mod ca;
mod config;
mod error;
mod filter;
mod health;
mod sort;
mod store;
mod store_manager;

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use anyhow::{Context, Result};
use crate::ca::CaClient;
use crate::config::Config;
use crate::store::db::BeaconDb;
use crate::store::trust::TrustDb;
use crate::store_manager::StoreHandle;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("control_mgmtd=info"))
        )
        .init();

    tracing::info!("Starting control-mgmtd");

    // Load config
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/etc/control-mgmtd/mgmtd.toml".to_string());

    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path))?;

    tracing::info!("Loaded config from {}", config_path);
    tracing::info!("Serving management API for {}", config.control.isd_as);

    // Open the beacon and trust databases
    let beacon_db = BeaconDb::open(&config.store.beacon_db_path)?;
    tracing::info!("Opened beacon database at {:?}", config.store.beacon_db_path);

    let trust_db = TrustDb::open(&config.store.trust_db_path)?;
    tracing::info!("Opened trust database at {:?}", config.store.trust_db_path);

    // Start the store thread
    let store = StoreHandle::spawn(beacon_db, trust_db);

    // CA probe is only wired up when configured
    let ca = match &config.ca {
        Some(ca_config) => Some(CaClient::new(ca_config)?),
        None => None,
    };

    // Create cancellation token for graceful shutdown
    let cancel = CancellationToken::new();

    // Spawn store maintenance task
    let maint_store = store.clone();
    let maint_config = config.store.clone();
    let maint_cancel = cancel.clone();
    let maint_handle = tokio::spawn(async move {
        if let Err(e) = store_manager::run(maint_store, maint_config, maint_cancel).await {
            tracing::error!("Store maintenance error: {}", e);
        }
    });

    // Build API router
    let app_state = api::routes::AppState {
        store: store.clone(),
        ca,
        config: Arc::new(config.clone()),
    };
    let app = api::routes::router(app_state);

    // Bind HTTP server
    let listener = tokio::net::TcpListener::bind(&config.api.listen)
        .await
        .with_context(|| format!("Failed to bind to {}", config.api.listen))?;

    tracing::info!("API listening on {}", config.api.listen);

    // Run server with graceful shutdown
    let server_cancel = cancel.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_cancel.cancelled().await })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutdown signal received");

    // Trigger cancellation
    cancel.cancel();

    // Wait for all tasks to complete
    let _ = tokio::join!(maint_handle, server_handle);

    // Shutdown store thread
    if let Err(e) = store.shutdown().await {
        tracing::error!("Failed to shutdown store: {}", e);
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
