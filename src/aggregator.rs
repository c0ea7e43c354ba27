// =============================================================================
// Bar Aggregator — materialises higher timeframes from 1-minute bars
// =============================================================================
//
// Maintains a per-symbol rolling buffer of the most recent 1-minute bars
// (fixed capacity K, ring-buffer indexed modulo K per the Design Notes
// "Rolling buffer as a growable list -> fixed-capacity ring buffer").
// On each incoming 1-minute bar: persist it, then for every enabled target
// interval recompute the containing bucket from the buffered 1-minute bars
// and upsert. Buckets are written even when incomplete — completeness is a
// property of readers (spec §4.2).
// =============================================================================

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use parking_lot::RwLock;
use tracing::info;

use crate::market_model::{bucket_start, Bar, Interval};
use crate::store::BarStore;

/// Rolling buffer capacity per symbol (K ~= 2000 one-minute bars).
const ROLLING_BUFFER_CAPACITY: usize = 2000;

/// Minimum gap between successive "bucket recomputed" log lines, per symbol.
const LOG_THROTTLE: std::time::Duration = std::time::Duration::from_secs(60);

/// Per-symbol sliding window of recent 1-minute bars. Used only to decide
/// which higher-timeframe buckets to recompute; not authoritative (the
/// store is authoritative).
struct RollingBuffer {
    bars: VecDeque<Bar>,
}

impl RollingBuffer {
    fn new() -> RollingBuffer {
        RollingBuffer {
            bars: VecDeque::with_capacity(ROLLING_BUFFER_CAPACITY + 1),
        }
    }

    fn push(&mut self, bar: Bar) {
        self.bars.push_back(bar);
        while self.bars.len() > ROLLING_BUFFER_CAPACITY {
            self.bars.pop_front();
        }
    }

    /// Bars whose `ts` falls in the half-open bucket `[start, start + width)`,
    /// oldest first (insertion order is already ts-ascending per producer
    /// ordering guarantees in spec §5).
    fn bucket_members(&self, start: i64, width: i64) -> Vec<&Bar> {
        self.bars
            .iter()
            .filter(|b| b.ts >= start && b.ts < start + width)
            .collect()
    }
}

/// Materialises higher-timeframe bars from a stream of finalised 1-minute
/// bars and persists both to the bar store.
pub struct Aggregator {
    store: Arc<BarStore>,
    targets: Vec<Interval>,
    buffers: RwLock<HashMap<String, RollingBuffer>>,
    last_log: RwLock<HashMap<String, Instant>>,
}

impl Aggregator {
    /// `targets` are the higher-timeframe intervals to derive; `1m` is
    /// always implicitly included as the base interval and need not (and
    /// should not) be listed.
    pub fn new(store: Arc<BarStore>, targets: Vec<Interval>) -> Aggregator {
        Aggregator {
            store,
            targets: targets.into_iter().filter(|i| *i != Interval::M1).collect(),
            buffers: RwLock::new(HashMap::new()),
            last_log: RwLock::new(HashMap::new()),
        }
    }

    /// Ingest one finalised 1-minute bar: append to the rolling buffer,
    /// persist it, then recompute and upsert every enabled higher-timeframe
    /// bucket that contains it.
    pub fn ingest_one_minute(&self, bar: Bar) -> Result<()> {
        debug_assert_eq!(bar.interval, Interval::M1);

        self.store.upsert(&bar)?;

        let mut derived = Vec::with_capacity(self.targets.len());
        {
            let mut buffers = self.buffers.write();
            let buf = buffers
                .entry(bar.symbol.clone())
                .or_insert_with(RollingBuffer::new);
            buf.push(bar.clone());

            for &interval in &self.targets {
                let width = interval.seconds();
                let start = bucket_start(bar.ts, interval);
                let members = buf.bucket_members(start, width);
                if let Some(agg) = aggregate_bucket(&bar.symbol, interval, start, &members) {
                    derived.push(agg);
                }
            }
        }

        if !derived.is_empty() {
            self.store.upsert_many(&derived)?;
        }

        self.throttled_log(&bar.symbol, derived.len());
        Ok(())
    }

    fn throttled_log(&self, symbol: &str, derived_count: usize) {
        let now = Instant::now();
        let mut last = self.last_log.write();
        let should_log = match last.get(symbol) {
            Some(prev) => now.duration_since(*prev) >= LOG_THROTTLE,
            None => true,
        };
        if should_log {
            last.insert(symbol.to_string(), now);
            info!(symbol, derived_count, "aggregator refreshed higher-timeframe buckets");
        }
    }
}

/// Compute the OHLCV aggregate of `members` (all sharing the same bucket)
/// into a single bar at `(symbol, interval, bucket_start)`. Returns `None`
/// when `members` is empty (nothing to aggregate this tick).
fn aggregate_bucket(
    symbol: &str,
    interval: Interval,
    bucket_start: i64,
    members: &[&Bar],
) -> Option<Bar> {
    let first = members.first()?;
    let last = members.iter().max_by_key(|b| b.ts)?;
    let open = first.open;
    let close = last.close;
    let high = members.iter().fold(f64::MIN, |acc, b| acc.max(b.high));
    let low = members.iter().fold(f64::MAX, |acc, b| acc.min(b.low));
    let volume: f64 = members.iter().map(|b| b.volume).sum();

    Some(Bar::new(symbol, interval, bucket_start, open, high, low, close, volume))
}
