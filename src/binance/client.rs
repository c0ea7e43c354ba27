// =============================================================================
// Binance REST Client — public market data only
// =============================================================================
//
// This engine never signs a request: it has no order-execution surface
// (spec §1 Non-goals — "No order execution"), so the only endpoint it needs
// is the public `GET /api/v3/klines`. The REST poller (§4.1) relies on
// Binance returning the most recent kline at index -1 (possibly still open)
// and the previous, closed, one at index -2.
// =============================================================================

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, instrument, warn};

use crate::binance::rate_limit::RateLimitTracker;
use crate::market_model::{Bar, Interval};

/// Request weight charged by `GET /api/v3/klines` for a single symbol
/// (Binance's published weight for this endpoint regardless of `limit`).
const KLINES_REQUEST_WEIGHT: u32 = 2;

/// Binance public REST client for kline history.
#[derive(Clone)]
pub struct BinanceClient {
    base_url: String,
    client: reqwest::Client,
    rate_limit: Arc<RateLimitTracker>,
}

impl BinanceClient {
    pub fn new() -> BinanceClient {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .expect("failed to build reqwest client");

        BinanceClient {
            base_url: "https://api.binance.com".to_string(),
            client,
            rate_limit: Arc::new(RateLimitTracker::new()),
        }
    }

    /// GET /api/v3/klines (public — no signature required).
    ///
    /// Returns bars parsed from Binance's array-of-arrays response format,
    /// oldest first. Array indices: `[0] openTime, [1] open, [2] high,
    /// [3] low, [4] close, [5] volume, [6] closeTime, ...` (remaining fields
    /// are ignored — this engine needs OHLCV only).
    #[instrument(skip(self), name = "binance::get_klines")]
    pub async fn get_klines(&self, symbol: &str, interval: Interval, limit: u32) -> Result<Vec<Bar>> {
        if !self.rate_limit.can_send_request(KLINES_REQUEST_WEIGHT) {
            anyhow::bail!("rate-limit budget exhausted for this window — deferring klines request");
        }

        let url = format!(
            "{}/api/v3/klines?symbol={}&interval={}&limit={}",
            self.base_url,
            symbol,
            interval.as_str(),
            limit
        );

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .context("GET /api/v3/klines request failed")?;

        let status = resp.status();
        self.rate_limit.update_from_headers(resp.headers());
        let body: serde_json::Value = resp
            .json()
            .await
            .context("failed to parse klines response")?;

        if !status.is_success() {
            anyhow::bail!("Binance GET /api/v3/klines returned {}: {}", status, body);
        }

        let raw = body.as_array().context("klines response is not an array")?;
        let mut bars = Vec::with_capacity(raw.len());

        for entry in raw {
            let arr = match entry.as_array() {
                Some(arr) if arr.len() >= 6 => arr,
                _ => {
                    warn!("skipping malformed kline entry");
                    continue;
                }
            };

            let open_time_ms = arr[0].as_i64().unwrap_or(0);
            let open = parse_str_f64(&arr[1])?;
            let high = parse_str_f64(&arr[2])?;
            let low = parse_str_f64(&arr[3])?;
            let close = parse_str_f64(&arr[4])?;
            let volume = parse_str_f64(&arr[5])?;

            bars.push(Bar::new(symbol, interval, open_time_ms / 1000, open, high, low, close, volume));
        }

        debug!(symbol, interval = %interval, count = bars.len(), "klines fetched");
        Ok(bars)
    }
}

impl Default for BinanceClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Binance sends numeric OHLCV fields as JSON strings.
fn parse_str_f64(val: &serde_json::Value) -> Result<f64> {
    if let Some(s) = val.as_str() {
        s.parse::<f64>().with_context(|| format!("failed to parse '{s}' as f64"))
    } else if let Some(n) = val.as_f64() {
        Ok(n)
    } else {
        anyhow::bail!("expected string or number, got: {val}")
    }
}
