// =============================================================================
// Candlekeep — Main Entry Point
// =============================================================================
//
// Boot sequence: load env + config, open the bar store, spawn the ingestion
// supervisor, serve the read API, and save configuration back to disk on a
// clean shutdown.
// =============================================================================

mod aggregator;
mod api;
mod app_state;
mod binance;
mod config;
mod market_model;
mod signals;
mod store;
mod supervisor;

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::config::EngineConfig;

const CONFIG_PATH: &str = "engine_config.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("candlekeep starting up");

    let mut config = EngineConfig::load(CONFIG_PATH).unwrap_or_else(|e| {
        warn!(error = %e, "failed to load engine config, using defaults");
        EngineConfig::default()
    });

    if let Ok(syms) = std::env::var("CANDLEKEEP_SYMBOLS") {
        let symbols: Vec<String> = syms.split(',').map(|s| s.trim().to_uppercase()).filter(|s| !s.is_empty()).collect();
        if !symbols.is_empty() {
            config.binance_symbols = symbols;
        }
    }
    if let Ok(addr) = std::env::var("CANDLEKEEP_BIND_ADDR") {
        config.bind_addr = addr;
    }

    info!(
        symbols = ?config.binance_symbols,
        transport = ?config.binance_transport,
        bar_intervals = ?config.bar_intervals,
        "engine configured"
    );

    // ── 2. Build shared state ────────────────────────────────────────────
    let state = Arc::new(AppState::new(config)?);

    // ── 3. Spawn the ingestion supervisor ────────────────────────────────
    let supervisor_handle = state.spawn_supervisor();

    // ── 4. Start the read API server ─────────────────────────────────────
    let bind_addr = state.config.bind_addr.clone();
    let app = api::rest::router(state.clone());
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "API server listening");

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "API server failed");
        }
    });

    info!("all subsystems running, press Ctrl+C to stop");

    // ── 5. Graceful shutdown ──────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("shutdown signal received — stopping gracefully");

    state.supervisor.shutdown();
    server_handle.abort();
    let _ = supervisor_handle.await;

    if let Err(e) = state.config.save(CONFIG_PATH) {
        error!(error = %e, "failed to save engine config on shutdown");
    }

    info!("candlekeep shut down complete");
    Ok(())
}
