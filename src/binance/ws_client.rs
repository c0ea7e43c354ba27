// =============================================================================
// Binance Kline WebSocket Client
// =============================================================================
//
// Opens a single multiplexed connection subscribed to the 1-minute kline
// stream for every configured symbol and forwards each finalised
// (`k.x == true`) candle to the aggregator. Connection failures before the
// first successful handshake are retried with exponential backoff +
// jitter; after `FAIL_FAST_HANDSHAKE_LIMIT` consecutive failures the client
// gives up and reports [`WsOutcome::Unavailable`] rather than retrying
// forever — the supervisor (§4.1/§4.10) decides what happens next (REST
// fallback in `auto` mode, a terminal log in `ws` mode).
//
// A stream that disconnects *after* a successful handshake is also treated
// as a producer exit (`WsOutcome::Disconnected`): this module performs no
// self-healing reconnection once it has been live, by design — the
// decision to restart WS (or not) belongs to the supervisor's state
// machine, never to the transport.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use rand::Rng;
use tokio::sync::Notify;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::aggregator::Aggregator;
use crate::market_model::{Bar, Interval};

/// Consecutive handshake failures tolerated before surfacing `Unavailable`.
const FAIL_FAST_HANDSHAKE_LIMIT: u32 = 3;
/// Backoff ceiling per spec §4.1: `delay = min(2^attempt + U(0,1), 60s)`.
const MAX_BACKOFF_SECS: f64 = 60.0;

/// Outcome of one [`run`] invocation — i.e. one producer lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WsOutcome {
    /// Cancelled cleanly via the shutdown signal; not a fallback trigger.
    Cancelled,
    /// Disconnected after a successful handshake, or never managed one
    /// within the fail-fast budget. Either way, the producer has exited.
    Disconnected,
    /// Gave up after `FAIL_FAST_HANDSHAKE_LIMIT` consecutive handshake
    /// failures.
    Unavailable,
}

/// Run the WS producer for `symbols` until it exits or `shutdown` fires.
///
/// `symbols` must already be uppercase account-agnostic ticker strings
/// (e.g. `"BTCUSDT"`); they are lower-cased for the wire subscription per
/// Binance's stream-name convention.
pub async fn run(symbols: Vec<String>, aggregator: Arc<Aggregator>, shutdown: Arc<Notify>) -> WsOutcome {
    if symbols.is_empty() {
        warn!("WS producer started with no symbols configured — exiting immediately");
        return WsOutcome::Disconnected;
    }

    let url = build_stream_url(&symbols);
    let mut consecutive_failures: u32 = 0;

    loop {
        info!(url = %url, "connecting to Binance kline WebSocket");

        let connect_fut = connect_async(&url);
        let connected = tokio::select! {
            res = connect_fut => res,
            _ = shutdown.notified() => return WsOutcome::Cancelled,
        };

        let ws_stream = match connected {
            Ok((stream, _response)) => stream,
            Err(e) => {
                consecutive_failures += 1;
                warn!(error = %e, attempt = consecutive_failures, "WS handshake failed");
                if consecutive_failures >= FAIL_FAST_HANDSHAKE_LIMIT {
                    error!("WS handshake failed {consecutive_failures} times in a row — reporting unavailable");
                    return WsOutcome::Unavailable;
                }
                if sleep_with_backoff(consecutive_failures, &shutdown).await {
                    return WsOutcome::Cancelled;
                }
                continue;
            }
        };

        info!(symbols = ?symbols, "WS connected and subscribed");
        consecutive_failures = 0;

        let (_write, mut read) = ws_stream.split();
        loop {
            let next = tokio::select! {
                msg = read.next() => msg,
                _ = shutdown.notified() => return WsOutcome::Cancelled,
            };

            match next {
                Some(Ok(Message::Text(text))) => {
                    match parse_kline_message(&text) {
                        Ok(Some(bar)) => {
                            debug!(symbol = %bar.symbol, close = bar.close, "finalised 1m bar from WS");
                            if let Err(e) = aggregator.ingest_one_minute(bar) {
                                warn!(error = %e, "failed to ingest WS bar");
                            }
                        }
                        Ok(None) => {} // kline still open — nothing to emit yet.
                        Err(e) => warn!(error = %e, "dropping malformed kline message"),
                    }
                }
                Some(Ok(_)) => {} // ping/pong/binary/close frames — tungstenite handles pong replies.
                Some(Err(e)) => {
                    warn!(error = %e, "WS read error — producer exiting");
                    return WsOutcome::Disconnected;
                }
                None => {
                    warn!("WS stream ended — producer exiting");
                    return WsOutcome::Disconnected;
                }
            }
        }
    }
}

/// Sleep for the backoff window for `attempt`, returning `true` if the
/// sleep was interrupted by a shutdown request.
async fn sleep_with_backoff(attempt: u32, shutdown: &Notify) -> bool {
    let jitter: f64 = rand::thread_rng().gen_range(0.0..1.0);
    let delay = (2f64.powi(attempt as i32) + jitter).min(MAX_BACKOFF_SECS);
    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs_f64(delay)) => false,
        _ = shutdown.notified() => true,
    }
}

fn build_stream_url(symbols: &[String]) -> String {
    let streams: Vec<String> = symbols
        .iter()
        .map(|s| format!("{}@kline_1m", s.to_lowercase()))
        .collect();
    format!("wss://stream.binance.com:9443/stream?streams={}", streams.join("/"))
}

/// Parse a combined-stream kline envelope. Returns `Ok(None)` for an
/// in-progress (not yet closed) candle — the supervisor only cares about
/// finalised bars.
fn parse_kline_message(text: &str) -> anyhow::Result<Option<Bar>> {
    let root: serde_json::Value = serde_json::from_str(text)?;
    let data = if root.get("data").is_some() { &root["data"] } else { &root };

    let symbol = data["s"]
        .as_str()
        .ok_or_else(|| anyhow::anyhow!("missing field s"))?
        .to_uppercase();

    let k = &data["k"];
    let is_closed = k["x"].as_bool().unwrap_or(false);
    if !is_closed {
        return Ok(None);
    }

    let open_time = k["t"].as_i64().ok_or_else(|| anyhow::anyhow!("missing field k.t"))? / 1000;
    let open = parse_str_f64(&k["o"])?;
    let high = parse_str_f64(&k["h"])?;
    let low = parse_str_f64(&k["l"])?;
    let close = parse_str_f64(&k["c"])?;
    let volume = parse_str_f64(&k["v"])?;

    Ok(Some(Bar::new(symbol, Interval::M1, open_time, open, high, low, close, volume)))
}

fn parse_str_f64(val: &serde_json::Value) -> anyhow::Result<f64> {
    match val {
        serde_json::Value::String(s) => s.parse::<f64>().map_err(Into::into),
        serde_json::Value::Number(n) => n.as_f64().ok_or_else(|| anyhow::anyhow!("not a valid f64")),
        _ => Err(anyhow::anyhow!("unexpected JSON type")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_url_contains_lowercase_streams() {
        let url = build_stream_url(&["BTCUSDT".to_string(), "ETHUSDT".to_string()]);
        assert!(url.contains("btcusdt@kline_1m"));
        assert!(url.contains("ethusdt@kline_1m"));
        assert!(url.starts_with("wss://stream.binance.com:9443/stream?streams="));
    }

    #[test]
    fn parse_open_kline_returns_none() {
        let json = r#"{"data":{"s":"BTCUSDT","k":{"t":0,"o":"1","h":"1","l":"1","c":"1","v":"1","x":false}}}"#;
        assert!(parse_kline_message(json).unwrap().is_none());
    }

    #[test]
    fn parse_closed_kline_returns_bar() {
        let json = r#"{"data":{"s":"btcusdt","k":{"t":60000,"o":"100","h":"101","l":"99","c":"100.5","v":"12.0","x":true}}}"#;
        let bar = parse_kline_message(json).unwrap().unwrap();
        assert_eq!(bar.symbol, "BTCUSDT");
        assert_eq!(bar.ts, 60);
        assert_eq!(bar.close, 100.5);
    }

    #[test]
    fn parse_malformed_message_errors() {
        assert!(parse_kline_message("not json").is_err());
    }
}
