// =============================================================================
// Binance REST Poller — failover market-data producer
// =============================================================================
//
// Every `poll_interval` seconds, fetches the latest two 1-minute klines for
// each configured symbol and emits the second-to-last (the most recently
// closed one). Deduplicates by `(symbol, ts)` so a bar already emitted is
// never emitted again even if the poll overlaps with itself.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::aggregator::Aggregator;
use crate::binance::BinanceClient;
use crate::market_model::Interval;

/// Outcome of a [`run`] invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestOutcome {
    /// Cancelled cleanly via the shutdown signal.
    Cancelled,
}

/// Run the REST poller for `symbols` until `shutdown` fires. Transient
/// network errors are logged and retried on the next tick; they never
/// terminate the poller (spec §4.1: "Transient network errors -> retry
/// with backoff").
pub async fn run(
    symbols: Vec<String>,
    client: Arc<BinanceClient>,
    aggregator: Arc<Aggregator>,
    poll_interval_secs: f64,
    shutdown: Arc<Notify>,
) -> RestOutcome {
    let mut last_emitted_ts: HashMap<String, i64> = HashMap::new();
    let interval = Duration::from_secs_f64(poll_interval_secs.max(0.1));

    loop {
        for symbol in &symbols {
            match client.get_klines(symbol, Interval::M1, 2).await {
                Ok(bars) if bars.len() >= 2 => {
                    // Index -2: the most recent *closed* kline (index -1 may
                    // still be open per the Binance public REST contract).
                    let closed = &bars[bars.len() - 2];
                    let already_emitted = last_emitted_ts.get(symbol) == Some(&closed.ts);
                    if !already_emitted {
                        if let Err(e) = aggregator.ingest_one_minute(closed.clone()) {
                            warn!(error = %e, symbol, "failed to ingest REST-polled bar");
                        } else {
                            last_emitted_ts.insert(symbol.clone(), closed.ts);
                            debug!(symbol, ts = closed.ts, "REST poller emitted closed bar");
                        }
                    }
                }
                Ok(_) => warn!(symbol, "REST poll returned fewer than 2 klines — skipping"),
                Err(e) => warn!(error = %e, symbol, "REST poll failed — retrying next tick"),
            }
        }

        let timed_out = tokio::select! {
            _ = tokio::time::sleep(interval) => true,
            _ = shutdown.notified() => false,
        };
        if !timed_out {
            return RestOutcome::Cancelled;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::BarStore;

    #[tokio::test]
    async fn shutdown_cancels_promptly() {
        let store = Arc::new(BarStore::open_in_memory().unwrap());
        let aggregator = Arc::new(Aggregator::new(store, vec![]));
        let client = Arc::new(BinanceClient::new());
        let shutdown = Arc::new(Notify::new());

        let shutdown_clone = shutdown.clone();
        let handle = tokio::spawn(run(vec![], client, aggregator, 5.0, shutdown_clone));

        shutdown.notify_one();
        let outcome = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("poller did not exit promptly")
            .unwrap();
        assert_eq!(outcome, RestOutcome::Cancelled);
    }
}
