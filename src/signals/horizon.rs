// =============================================================================
// Per-Horizon Signal Builder
// =============================================================================
//
// Turns one horizon's bar history into a directional score, a strength
// magnitude, a confidence value, and horizon-prefixed rationale tags
// (spec §4.5). Also carries the raw entry/invalidation reference prices
// (`last_close`, `window_min_low`, `window_max_high`) the trade planner
// needs, so the planner never has to re-read bars itself.
// =============================================================================

use crate::market_model::{Bar, Interval};

use super::confidence::{continuity_ratio, score_confidence};
use super::features::{extract_features, BarView, FeatureSet};

/// `direction_score` boundary for a "strong" directional tag.
const STRONG_TAG_THRESHOLD: f64 = 0.5;
/// `direction_score` boundary below which a horizon is tagged neutral.
const NEUTRAL_TAG_THRESHOLD: f64 = 0.2;
/// Volatility above which a horizon is tagged `{h}_high_volatility`
/// rather than `{h}_low_volatility`. Not pinned by the source material;
/// chosen so a flat market (S1/S2-style) reads as low volatility.
const HIGH_VOLATILITY_THRESHOLD: f64 = 0.015;
/// Confidence at/above which a horizon is tagged `{h}_high_confidence`.
const HORIZON_HIGH_CONFIDENCE_THRESHOLD: f64 = 0.75;
/// Confidence at/below which a horizon is tagged `{h}_low_confidence`.
const HORIZON_LOW_CONFIDENCE_THRESHOLD: f64 = 0.4;

#[derive(Debug, Clone, serde::Serialize)]
pub struct HorizonSignal {
    pub interval: Interval,
    pub direction_score: f64,
    pub strength: f64,
    pub confidence: f64,
    pub rationale: Vec<String>,
    pub features: FeatureSet,
    /// Close of the most recent bar — the trade planner's entry price
    /// when this horizon is selected as primary.
    pub last_close: f64,
    /// Minimum `low` over the analysed window.
    pub window_min_low: f64,
    /// Maximum `high` over the analysed window.
    pub window_max_high: f64,
}

/// Build a horizon signal from `bars` (oldest first, same interval).
pub fn build_horizon_signal(interval: Interval, bars: &[Bar]) -> HorizonSignal {
    let views: Vec<BarView> = bars.iter().map(BarView::from).collect();
    let timestamps: Vec<i64> = bars.iter().map(|b| b.ts).collect();

    let features = extract_features(&views);
    let continuity = continuity_ratio(&timestamps, interval.seconds());
    let confidence = score_confidence(features.n_bars, continuity, features.volatility);

    let direction_score = (features.momentum * features.stability).clamp(-1.0, 1.0);
    let strength = features.momentum.abs().clamp(0.0, 1.0);

    let (last_close, window_min_low, window_max_high) = match bars.last() {
        Some(last) => {
            let min_low = bars.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
            let max_high = bars.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
            (last.close, min_low, max_high)
        }
        None => (0.0, 0.0, 0.0),
    };

    let rationale = build_rationale(interval, &features, direction_score, confidence, continuity);

    HorizonSignal {
        interval,
        direction_score,
        strength,
        confidence,
        rationale,
        features,
        last_close,
        window_min_low,
        window_max_high,
    }
}

fn build_rationale(
    interval: Interval,
    features: &FeatureSet,
    direction_score: f64,
    confidence: f64,
    continuity: f64,
) -> Vec<String> {
    let h = interval.as_str();
    let mut tags = Vec::new();

    let direction_tag = if direction_score >= STRONG_TAG_THRESHOLD {
        "strong_bullish"
    } else if direction_score >= NEUTRAL_TAG_THRESHOLD {
        "weak_bullish"
    } else if direction_score <= -STRONG_TAG_THRESHOLD {
        "strong_bearish"
    } else if direction_score <= -NEUTRAL_TAG_THRESHOLD {
        "weak_bearish"
    } else {
        "neutral"
    };
    tags.push(format!("{h}_{direction_tag}"));

    if features.volatility >= HIGH_VOLATILITY_THRESHOLD {
        tags.push(format!("{h}_high_volatility"));
    } else {
        tags.push(format!("{h}_low_volatility"));
    }

    if confidence >= HORIZON_HIGH_CONFIDENCE_THRESHOLD {
        tags.push(format!("{h}_high_confidence"));
    } else if confidence <= HORIZON_LOW_CONFIDENCE_THRESHOLD {
        tags.push(format!("{h}_low_confidence"));
    }

    let _ = continuity; // folded into `confidence` already; kept as a parameter for clarity at call sites.

    tags
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(interval: Interval, ts: i64, close: f64) -> Bar {
        Bar::new("BTCUSDT", interval, ts, close, close + 0.1, close - 0.1, close, 10.0)
    }

    #[test]
    fn strong_uptrend_yields_strong_bullish_tag() {
        let bars: Vec<Bar> = (0..20)
            .map(|i| bar(Interval::M1, i as i64 * 60, 100.0 + i as f64))
            .collect();
        let signal = build_horizon_signal(Interval::M1, &bars);
        assert!(signal.direction_score > 0.0);
        assert!(signal.rationale.contains(&"1m_strong_bullish".to_string()));
        assert_eq!(signal.last_close, 119.0);
    }

    #[test]
    fn sparse_history_is_tagged_low_confidence() {
        let bars: Vec<Bar> = (0..3)
            .map(|i| bar(Interval::M1, i as i64 * 60, 100.0 + i as f64))
            .collect();
        let signal = build_horizon_signal(Interval::M1, &bars);
        assert!(signal.confidence < 0.5);
        assert!(signal.rationale.contains(&"1m_low_confidence".to_string()));
    }

    #[test]
    fn flat_market_has_neutral_tag() {
        let bars: Vec<Bar> = (0..20).map(|i| bar(Interval::H1, i as i64 * 3600, 100.0)).collect();
        let signal = build_horizon_signal(Interval::H1, &bars);
        assert!(signal.rationale.contains(&"1h_neutral".to_string()));
        assert!(signal.rationale.contains(&"1h_low_volatility".to_string()));
    }

    #[test]
    fn window_bounds_track_extremes() {
        let bars: Vec<Bar> = (0..20)
            .map(|i| bar(Interval::M1, i as i64 * 60, 100.0 + i as f64))
            .collect();
        let signal = build_horizon_signal(Interval::M1, &bars);
        assert!((signal.window_min_low - 99.9).abs() < 1e-9);
        assert!((signal.window_max_high - 119.1).abs() < 1e-9);
    }
}
