// =============================================================================
// Engine Configuration — settings with atomic save
// =============================================================================
//
// Central configuration for the ingestion/signal engine. Every field
// carries a serde default so an older config file on disk never fails to
// load after a field is added (spec §6).
//
// Persistence uses an atomic tmp + rename pattern to prevent corruption on
// crash, adapted from the runtime-config module this file replaces.
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::market_model::Interval;
use crate::supervisor::Transport;

fn default_providers() -> Vec<String> {
    vec!["binance".to_string()]
}

fn default_binance_symbols() -> Vec<String> {
    vec![
        "BTCUSDT".to_string(),
        "ETHUSDT".to_string(),
        "BNBUSDT".to_string(),
        "XRPUSDT".to_string(),
        "SOLUSDT".to_string(),
    ]
}

fn default_binance_transport() -> Transport {
    Transport::Auto
}

fn default_binance_rest_poll_seconds() -> f64 {
    5.0
}

fn default_bar_intervals() -> Vec<Interval> {
    vec![Interval::M5, Interval::M15, Interval::H1, Interval::H4, Interval::D1, Interval::W1]
}

fn default_store_path() -> String {
    "./data/bars.sqlite3".to_string()
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

/// Top-level engine configuration (spec §6). Every field has a serde
/// default so older JSON files missing new fields still deserialise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Configured upstream market-data providers. Only `binance` is
    /// implemented; the field is a list so a future provider slots in
    /// without a config-shape break.
    #[serde(default = "default_providers")]
    pub providers: Vec<String>,

    /// Symbols ingested from Binance.
    #[serde(default = "default_binance_symbols")]
    pub binance_symbols: Vec<String>,

    /// Transport policy for the Binance producer: `ws`, `rest`, or `auto`.
    #[serde(default = "default_binance_transport")]
    pub binance_transport: Transport,

    /// REST poll interval in seconds, used both in `rest` mode and as the
    /// fallback cadence in `auto` mode.
    #[serde(default = "default_binance_rest_poll_seconds")]
    pub binance_rest_poll_seconds: f64,

    /// Higher-timeframe intervals the aggregator derives from 1-minute
    /// bars. `1m` is implicit and should not be listed.
    #[serde(default = "default_bar_intervals")]
    pub bar_intervals: Vec<Interval>,

    /// Path to the embedded SQLite bar store.
    #[serde(default = "default_store_path")]
    pub store_path: String,

    /// HTTP bind address for the read API.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            providers: default_providers(),
            binance_symbols: default_binance_symbols(),
            binance_transport: default_binance_transport(),
            binance_rest_poll_seconds: default_binance_rest_poll_seconds(),
            bar_intervals: default_bar_intervals(),
            store_path: default_store_path(),
            bind_addr: default_bind_addr(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read engine config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse engine config from {}", path.display()))?;

        info!(
            path = %path.display(),
            symbols = ?config.binance_symbols,
            transport = ?config.binance_transport,
            "engine config loaded"
        );

        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self).context("failed to serialise engine config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "engine config saved (atomic)");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.providers, vec!["binance".to_string()]);
        assert_eq!(cfg.binance_symbols.len(), 5);
        assert_eq!(cfg.binance_transport, Transport::Auto);
        assert!(cfg.bar_intervals.contains(&Interval::H1));
        assert!(!cfg.bar_intervals.contains(&Interval::M1));
    }

    #[test]
    fn deserialise_empty_json_uses_defaults() {
        let cfg: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.binance_symbols.len(), 5);
        assert_eq!(cfg.bind_addr, "0.0.0.0:8080");
    }

    #[test]
    fn deserialise_partial_json_fills_defaults() {
        let json = r#"{ "binance_symbols": ["ETHUSDT"], "binance_transport": "ws" }"#;
        let cfg: EngineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.binance_symbols, vec!["ETHUSDT"]);
        assert_eq!(cfg.binance_transport, Transport::Ws);
        assert_eq!(cfg.store_path, default_store_path());
    }

    #[test]
    fn roundtrip_serialisation() {
        let cfg = EngineConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let cfg2: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg.binance_symbols, cfg2.binance_symbols);
        assert_eq!(cfg.bar_intervals, cfg2.bar_intervals);
    }

    #[test]
    fn save_then_load_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine_config.json");
        let cfg = EngineConfig::default();
        cfg.save(&path).unwrap();
        let loaded = EngineConfig::load(&path).unwrap();
        assert_eq!(cfg.binance_symbols, loaded.binance_symbols);
        assert_eq!(cfg.bind_addr, loaded.bind_addr);
    }
}
