// =============================================================================
// Confidence Scorer
// =============================================================================
//
// Composite of three independent terms: data sufficiency, timestamp
// continuity, and a volatility penalty. Pure function of `n_bars`, a
// caller-supplied continuity ratio, and `volatility` (spec §4.4).
// =============================================================================

use super::features::LOOKBACK;

/// Below this many bars, sufficiency is capped under 0.5 regardless of the
/// raw `n_bars / expected_bars` ratio (spec §4.4).
pub const MIN_BARS_FOR_CONFIDENCE: usize = 10;

/// Ceiling on how much the volatility term alone can depress confidence.
pub const MAX_VOLATILITY_PENALTY: f64 = 0.5;

/// Scales raw volatility (stdev of log returns) into a penalty fraction
/// before [`MAX_VOLATILITY_PENALTY`] caps it. Not given explicitly in the
/// source material; tuned so that the flat/low-volatility case (S1-style
/// scenarios) keeps its penalty near zero while a clearly choppy market
/// approaches the cap.
const VOLATILITY_PENALTY_SCALE: f64 = 5.0;

/// Expected bar count for a full-confidence read on any horizon. The
/// source material does not give a per-horizon table, so this crate uses
/// the same lookback the feature extractor already requires for a
/// complete window (`MOMENTUM_LOOKBACK` / `VOLATILITY_LOOKBACK`, both 20).
pub fn expected_bars() -> usize {
    LOOKBACK
}

/// Cap applied to sufficiency when `n_bars` is below [`MIN_BARS_FOR_CONFIDENCE`].
const INSUFFICIENT_SUFFICIENCY_CAP: f64 = 0.49;
/// Cap applied to continuity when timestamps are non-monotonic.
const NON_MONOTONIC_CONTINUITY_CAP: f64 = 0.49;

/// Score confidence in `[0, 1]` from `n_bars`, a `continuity` ratio, and
/// `volatility` (spec §4.4: `confidence = sufficiency * continuity * volatility_penalty`).
pub fn score_confidence(n_bars: usize, continuity: f64, volatility: f64) -> f64 {
    let raw_sufficiency = (n_bars as f64 / expected_bars() as f64).min(1.0);
    let sufficiency = if n_bars < MIN_BARS_FOR_CONFIDENCE {
        raw_sufficiency.min(INSUFFICIENT_SUFFICIENCY_CAP)
    } else {
        raw_sufficiency
    };

    let continuity = continuity.clamp(0.0, 1.0);
    let volatility_penalty = 1.0 - (VOLATILITY_PENALTY_SCALE * volatility).min(MAX_VOLATILITY_PENALTY);

    (sufficiency * continuity * volatility_penalty).clamp(0.0, 1.0)
}

/// Continuity ratio for an ordered timestamp slice: 1.0 if every gap
/// equals `expected_spacing_secs`, decreasing linearly with the fraction
/// of gaps that don't. Non-monotonic input (a timestamp not strictly
/// greater than its predecessor) is forced below 0.5, per spec §4.4.
/// Returns `1.0` for fewer than two timestamps.
pub fn continuity_ratio(timestamps: &[i64], expected_spacing_secs: i64) -> f64 {
    if timestamps.len() < 2 || expected_spacing_secs <= 0 {
        return 1.0;
    }

    let non_monotonic = timestamps.windows(2).any(|pair| pair[1] <= pair[0]);

    let matching = timestamps
        .windows(2)
        .filter(|pair| pair[1] - pair[0] == expected_spacing_secs)
        .count();
    let ratio = matching as f64 / (timestamps.len() - 1) as f64;

    if non_monotonic {
        ratio.min(NON_MONOTONIC_CONTINUITY_CAP)
    } else {
        ratio
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_lookback_clean_data_is_high_confidence() {
        let c = score_confidence(LOOKBACK, 1.0, 0.0);
        assert!(c >= 0.6, "expected >= 0.6, got {c}");
    }

    #[test]
    fn below_minimum_bars_caps_sufficiency_under_half() {
        let c = score_confidence(5, 1.0, 0.0);
        assert!(c < 0.5, "expected < 0.5, got {c}");
    }

    #[test]
    fn high_volatility_is_penalised_but_capped() {
        let c = score_confidence(LOOKBACK, 1.0, 10.0);
        assert!((c - (1.0 * 1.0 * (1.0 - MAX_VOLATILITY_PENALTY))).abs() < 1e-9);
    }

    #[test]
    fn broken_continuity_reduces_confidence() {
        let full = score_confidence(LOOKBACK, 1.0, 0.0);
        let broken = score_confidence(LOOKBACK, 0.5, 0.0);
        assert!(broken < full);
    }

    #[test]
    fn continuity_ratio_all_matching() {
        let ts = vec![0, 60, 120, 180];
        assert_eq!(continuity_ratio(&ts, 60), 1.0);
    }

    #[test]
    fn continuity_ratio_detects_gaps() {
        let ts = vec![0, 60, 240, 300];
        assert!((continuity_ratio(&ts, 60) - 0.6666666666666666).abs() < 1e-9);
    }

    #[test]
    fn non_monotonic_timestamps_cap_continuity_below_half() {
        let ts = vec![0, 60, 30, 90];
        assert!(continuity_ratio(&ts, 60) < 0.5);
    }
}
