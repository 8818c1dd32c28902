//! Feedtrack API Server
//!
//! Run with: cargo run --bin feedtrack-api
//!
//! # Configuration
//!
//! Read from the usual config file locations (see `feedtrack config`), then
//! overridden by environment variables:
//! - `FEEDTRACK_BACKEND`: memory, blob, kv, sql or http (default: sql)
//! - `FEEDTRACK_DATA_DIR`: Directory for on-disk backends
//! - `FEEDTRACK_API_HOST`: Host to bind to (default: 0.0.0.0)
//! - `FEEDTRACK_API_PORT`: Port to listen on (default: 8787)
//! - `RUST_LOG`: Log filter (default: feedtrack=info)

use anyhow::Context;
use feedtrack::api::{serve, ApiConfig, AppState};
use feedtrack::config::Config;
use feedtrack::{logging, storage};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load_default();
    logging::init(&config.logging);

    tracing::info!("Starting feedtrack API server v{}", env!("CARGO_PKG_VERSION"));

    let store = storage::open_store(&config.storage).context("failed to open feed store")?;
    tracing::info!(backend = %store.backend(), "Feed store ready");

    let api_config = ApiConfig::from(&config.api);
    let state = AppState::new(store, api_config.clone());

    serve(state, &api_config).await.context("API server failed")?;

    tracing::info!("Feedtrack API server stopped");
    Ok(())
}
