// =============================================================================
// Central Application State
// =============================================================================
//
// The single source of truth the read API and the ingestion supervisor both
// hold a reference to. Kept deliberately thin: storage and ingestion own
// their own interior mutability, `AppState` just ties the handles together
// (spec §5: "shared mutable state lives behind `Arc` + `parking_lot`").
// =============================================================================

use std::sync::Arc;

use crate::aggregator::Aggregator;
use crate::binance::BinanceClient;
use crate::config::EngineConfig;
use crate::store::BarStore;
use crate::supervisor::StreamingSupervisor;

/// Shared application state, held behind `Arc<AppState>` by every async task
/// and every API handler.
pub struct AppState {
    pub config: EngineConfig,
    pub store: Arc<BarStore>,
    pub aggregator: Arc<Aggregator>,
    pub binance_client: Arc<BinanceClient>,
    pub supervisor: Arc<StreamingSupervisor>,
}

impl AppState {
    /// Construct the application state from `config`. Opens the bar store at
    /// `config.store_path` and wires up the aggregator and supervisor with
    /// the configured symbols, intervals, and transport.
    pub fn new(config: EngineConfig) -> anyhow::Result<AppState> {
        let store = Arc::new(BarStore::open(&config.store_path)?);
        let aggregator = Arc::new(Aggregator::new(store.clone(), config.bar_intervals.clone()));
        let binance_client = Arc::new(BinanceClient::new());
        let supervisor = Arc::new(StreamingSupervisor::new(
            config.binance_transport,
            config.binance_symbols.clone(),
            config.binance_rest_poll_seconds,
        ));

        Ok(AppState {
            config,
            store,
            aggregator,
            binance_client,
            supervisor,
        })
    }

    /// Spawn the ingestion supervisor as a background task. Returns its
    /// `JoinHandle` so the caller can await it during shutdown if desired.
    pub fn spawn_supervisor(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let supervisor = self.supervisor.clone();
        let client = self.binance_client.clone();
        let aggregator = self.aggregator.clone();
        tokio::spawn(async move {
            supervisor.run(client, aggregator).await;
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_from_default_config_with_in_memory_friendly_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = EngineConfig::default();
        config.store_path = dir.path().join("bars.sqlite3").to_string_lossy().to_string();
        config.binance_symbols = vec!["BTCUSDT".to_string()];

        let state = AppState::new(config).unwrap();
        assert_eq!(state.store.symbols().unwrap().len(), 0);
        assert_eq!(state.supervisor.status().symbols, vec!["BTCUSDT".to_string()]);
    }
}
