// =============================================================================
// Bar / Interval — core OHLCV data model
// =============================================================================
//
// A `Bar` is an immutable OHLCV record for one `(symbol, interval, ts)` key.
// `Interval` enumerates the canonical bucket durations this engine derives
// from 1-minute bars. Bucket alignment follows `bucket_start`, anchored to
// the Unix epoch in UTC for every interval including weekly (see the
// Open Question resolved in DESIGN.md: weekly buckets anchor to the
// epoch-Thursday boundary, not to Monday 00:00 UTC).
// =============================================================================

use serde::{Deserialize, Serialize};

/// Canonical timeframe label. Ordered shortest-to-longest; the ordering is
/// load-bearing for "primary horizon = longest analysed" selection and for
/// the short/long split used by consensus conflict detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1d")]
    D1,
    #[serde(rename = "1w")]
    W1,
}

impl Interval {
    /// All supported intervals, shortest first.
    pub const ALL: [Interval; 7] = [
        Interval::M1,
        Interval::M5,
        Interval::M15,
        Interval::H1,
        Interval::H4,
        Interval::D1,
        Interval::W1,
    ];

    /// Horizons analysed when a `/v1/signal` request omits `horizons`
    /// (spec §6 `DEFAULT_HORIZONS`). Notably excludes `1w` — the default
    /// signal request favours horizons where the engine can usually field
    /// enough bars for a confident read.
    pub const DEFAULT_HORIZONS: [Interval; 6] = [
        Interval::M1,
        Interval::M5,
        Interval::M15,
        Interval::H1,
        Interval::H4,
        Interval::D1,
    ];

    /// Bucket width in seconds.
    pub fn seconds(self) -> i64 {
        match self {
            Interval::M1 => 60,
            Interval::M5 => 300,
            Interval::M15 => 900,
            Interval::H1 => 3_600,
            Interval::H4 => 14_400,
            Interval::D1 => 86_400,
            Interval::W1 => 604_800,
        }
    }

    /// Wire / storage label, e.g. `"1m"`.
    pub fn as_str(self) -> &'static str {
        match self {
            Interval::M1 => "1m",
            Interval::M5 => "5m",
            Interval::M15 => "15m",
            Interval::H1 => "1h",
            Interval::H4 => "4h",
            Interval::D1 => "1d",
            Interval::W1 => "1w",
        }
    }

    /// Parse a wire label back into an `Interval`. Returns `None` for any
    /// string outside the canonical `1m,5m,15m,1h,4h,1d,1w` set.
    pub fn parse(s: &str) -> Option<Interval> {
        Interval::ALL.into_iter().find(|i| i.as_str() == s)
    }

    /// Short-horizon bucket used by consensus conflict detection
    /// (spec §4.6: "short" = 1m, 5m, 15m).
    pub fn is_short_term(self) -> bool {
        matches!(self, Interval::M1 | Interval::M5 | Interval::M15)
    }

    /// Long-horizon bucket used by consensus conflict detection
    /// (spec §4.6: "long" = 1h, 4h, 1d, 1w).
    pub fn is_long_term(self) -> bool {
        matches!(self, Interval::H1 | Interval::H4 | Interval::D1 | Interval::W1)
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Immutable OHLCV bar keyed by `(symbol, interval, ts)`.
///
/// Invariants (enforced by [`Bar::new`]):
/// `low <= min(open, close) <= max(open, close) <= high`, `volume >= 0`,
/// `ts % interval.seconds() == 0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: String,
    pub interval: Interval,
    /// Unix seconds at bucket start, UTC.
    pub ts: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// Construct a bar, clamping `high`/`low` to remain consistent with
    /// `open`/`close` and the bucket boundary for `interval`. This defends
    /// against malformed upstream data (spec §7: "Protocol / parse errors
    /// ... logged, dropped; never fatal") by repairing rather than
    /// rejecting, since the aggregator must never panic on a finalised
    /// exchange bar.
    pub fn new(
        symbol: impl Into<String>,
        interval: Interval,
        ts: i64,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Bar {
        let bucket = bucket_start(ts, interval);
        let lo = low.min(open).min(close);
        let hi = high.max(open).max(close);
        Bar {
            symbol: symbol.into().to_uppercase(),
            interval,
            ts: bucket,
            open,
            high: hi,
            low: lo,
            close,
            volume: volume.max(0.0),
        }
    }

    /// `true` iff the invariants in spec §3 hold exactly (no repair applied).
    pub fn is_valid(&self) -> bool {
        self.low <= self.open.min(self.close)
            && self.open.max(self.close) <= self.high
            && self.volume >= 0.0
            && self.ts % self.interval.seconds() == 0
    }
}

/// `bucket_start(ts, I) = (ts // I) * I`, anchored to the Unix epoch in UTC.
///
/// Weekly buckets use the same formula with `I = 604_800`, which anchors
/// weeks to the Unix-epoch Thursday rather than Monday 00:00 UTC — see
/// DESIGN.md for why this repo accepts that as the canonical alignment
/// instead of guessing at a Monday-anchored variant.
pub fn bucket_start(ts: i64, interval: Interval) -> i64 {
    let secs = interval.seconds();
    ts.div_euclid(secs) * secs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_start_minute_aligned() {
        assert_eq!(bucket_start(125, Interval::M1), 120);
        assert_eq!(bucket_start(60, Interval::M1), 60);
        assert_eq!(bucket_start(0, Interval::M1), 0);
    }

    #[test]
    fn bucket_start_weekly_anchors_to_epoch() {
        // Unix epoch (1970-01-01) was a Thursday; bucket_start(0, 1w) == 0.
        assert_eq!(bucket_start(0, Interval::W1), 0);
        assert_eq!(bucket_start(604_800 + 10, Interval::W1), 604_800);
    }

    #[test]
    fn interval_parse_round_trips() {
        for i in Interval::ALL {
            assert_eq!(Interval::parse(i.as_str()), Some(i));
        }
        assert_eq!(Interval::parse("2m"), None);
    }

    #[test]
    fn bar_new_repairs_inconsistent_high_low() {
        let b = Bar::new("btcusdt", Interval::M1, 60, 100.0, 99.0, 101.0, 100.5, -5.0);
        assert!(b.is_valid());
        assert_eq!(b.symbol, "BTCUSDT");
        assert_eq!(b.volume, 0.0);
    }

    #[test]
    fn short_long_term_classification() {
        assert!(Interval::M1.is_short_term());
        assert!(Interval::M15.is_short_term());
        assert!(!Interval::H1.is_short_term());
        assert!(Interval::H1.is_long_term());
        assert!(Interval::W1.is_long_term());
        assert!(!Interval::M5.is_long_term());
    }
}
