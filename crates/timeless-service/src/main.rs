//! Binary entry point: wires config, store, sweeper, and router together
//! and serves the Timeless generation API.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use timeless_service::{create_router, AppState, ServiceConfig, Sweeper};
use timeless_store::RocksStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Tracing first, so config loading can log
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,timeless=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Timeless Service");

    let config = ServiceConfig::from_env();

    tracing::info!(
        listen_addr = %config.listen_addr,
        data_dir = %config.data_dir,
        fal_configured = %config.fal_api_key.is_some(),
        kie_configured = %config.kie_api_key.is_some(),
        "Service configuration loaded"
    );

    tracing::info!(path = %config.data_dir, "Opening RocksDB store");
    let store = Arc::new(RocksStore::open(&config.data_dir)?);

    // State is shared between the router and the sweeper task
    let state = Arc::new(AppState::new(store, config.clone()));

    tokio::spawn(Sweeper::new(Arc::clone(&state)).run());

    let app = create_router(state);

    tracing::info!(listen_addr = %config.listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
