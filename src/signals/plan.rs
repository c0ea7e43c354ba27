// =============================================================================
// Trade Plan Builder
// =============================================================================
//
// Turns a discrete state plus the horizon signals that fed the consensus
// into an advisory entry/invalidation/validity/size sketch (spec §4.8).
// This module never places or tracks an order — it only describes one, for
// the API consumer to act on or ignore (spec Non-goals: no order
// execution).
//
// The "primary horizon" driving entry/invalidation is the longest horizon
// among those with any analysed data — see DESIGN.md for why this crate
// resolves that Open Question toward "longest qualifying horizon" rather
// than, say, the horizon with highest confidence.
// =============================================================================

use serde::Serialize;

use crate::market_model::Interval;

use super::consensus::ConsensusSignal;
use super::horizon::HorizonSignal;
use super::state::SignalState;

/// Fractional distance from the window extreme at which a plan is
/// considered invalidated (spec §6 `INVALIDATION_BUFFER_PCT`).
pub const INVALIDATION_BUFFER_PCT: f64 = 0.02;

/// How long a plan remains valid, keyed by the primary horizon (spec §6
/// `VALIDITY_WINDOW`, seconds).
fn validity_window_secs(interval: Interval) -> i64 {
    match interval {
        Interval::M1 => 300,
        Interval::M5 => 3_600,
        Interval::M15 => 14_400,
        Interval::H1 => 21_600,
        Interval::H4 => 86_400,
        Interval::D1 => 432_000,
        Interval::W1 => 1_209_600,
    }
}

/// Suggested position-size multiplier, keyed by consensus confidence
/// (spec §6 `SIZE_BY_CONFIDENCE`, exact piecewise table).
fn size_suggestion_pct(confidence: f64) -> f64 {
    if confidence < 0.4 {
        0.25
    } else if confidence < 0.6 {
        0.5
    } else if confidence < 0.75 {
        1.0
    } else if confidence < 0.9 {
        1.5
    } else {
        2.0
    }
}

/// Rationale tag naming the sizing band a confidence value falls into.
/// Kept in lockstep with `size_suggestion_pct`'s bands.
fn sizing_band_tag(confidence: f64) -> &'static str {
    if confidence < 0.4 {
        "size_minimal"
    } else if confidence < 0.6 {
        "size_small"
    } else if confidence < 0.75 {
        "size_standard"
    } else if confidence < 0.9 {
        "size_elevated"
    } else {
        "size_maximal"
    }
}

/// `long_position` / `short_position` / `no_position_neutral`, per state
/// (spec §4.8).
fn position_tag(state: SignalState) -> &'static str {
    match state {
        SignalState::Buy | SignalState::StrongBuy => "long_position",
        SignalState::Sell | SignalState::StrongSell => "short_position",
        SignalState::Neutral => "no_position_neutral",
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TradePlan {
    pub state: SignalState,
    pub confidence: f64,
    pub entry_price: Option<f64>,
    pub invalidation_price: Option<f64>,
    pub valid_until_ts: i64,
    pub size_suggestion_pct: f64,
    pub rationale: Vec<String>,
    pub horizons_analyzed: Vec<Interval>,
}

/// Pick the longest horizon among those that produced any bars at all —
/// the primary horizon that drives entry price and invalidation.
fn primary_horizon(signals: &[HorizonSignal]) -> Option<&HorizonSignal> {
    signals
        .iter()
        .filter(|s| s.features.n_bars > 0)
        .max_by_key(|s| s.interval)
}

/// Build a trade plan for `state` from the horizon signals that fed
/// `consensus`. `now_ts` is the plan's reference time (Unix seconds),
/// supplied by the caller so this function stays a pure computation.
pub fn build_trade_plan(
    state: SignalState,
    consensus: &ConsensusSignal,
    signals: &[HorizonSignal],
    now_ts: i64,
) -> TradePlan {
    let horizons_analyzed: Vec<Interval> = signals.iter().map(|s| s.interval).collect();
    let size = size_suggestion_pct(consensus.confidence);

    let mut rationale = vec![state.tag(), position_tag(state).to_string(), sizing_band_tag(consensus.confidence).to_string()];
    if consensus.agreement_score < 0.5 {
        rationale.push("low_agreement_warning".to_string());
    }

    let primary = match primary_horizon(signals) {
        Some(p) => p,
        None => {
            return TradePlan {
                state,
                confidence: consensus.confidence,
                entry_price: None,
                invalidation_price: None,
                valid_until_ts: now_ts,
                size_suggestion_pct: size,
                rationale,
                horizons_analyzed,
            };
        }
    };

    let valid_until_ts = now_ts + validity_window_secs(primary.interval);
    let entry = primary.last_close;

    let invalidation = match state {
        SignalState::Buy | SignalState::StrongBuy => {
            let candidate = primary.window_min_low * (1.0 - INVALIDATION_BUFFER_PCT);
            if candidate < entry {
                candidate
            } else {
                entry * (1.0 - INVALIDATION_BUFFER_PCT)
            }
        }
        SignalState::Sell | SignalState::StrongSell => {
            let candidate = primary.window_max_high * (1.0 + INVALIDATION_BUFFER_PCT);
            if candidate > entry {
                candidate
            } else {
                entry * (1.0 + INVALIDATION_BUFFER_PCT)
            }
        }
        SignalState::Neutral => {
            let lower = primary.window_min_low * (1.0 - INVALIDATION_BUFFER_PCT);
            let upper = primary.window_max_high * (1.0 + INVALIDATION_BUFFER_PCT);
            if (entry - lower).abs() <= (upper - entry).abs() {
                lower
            } else {
                upper
            }
        }
    };

    let entry_price = match state {
        SignalState::Neutral => None,
        _ => Some(entry),
    };

    TradePlan {
        state,
        confidence: consensus.confidence,
        entry_price,
        invalidation_price: Some(invalidation),
        valid_until_ts,
        size_suggestion_pct: size,
        rationale,
        horizons_analyzed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::features::FeatureSet;

    fn signal(interval: Interval, direction_score: f64, last_close: f64, low: f64, high: f64) -> HorizonSignal {
        HorizonSignal {
            interval,
            direction_score,
            strength: direction_score.abs(),
            confidence: 0.9,
            rationale: vec![],
            features: FeatureSet {
                n_bars: 20,
                momentum: direction_score,
                volatility: 0.0,
                trend_direction: if direction_score > 0.0 { 1 } else { -1 },
                stability: 1.0,
                avg_range: 1.0,
            },
            last_close,
            window_min_low: low,
            window_max_high: high,
        }
    }

    fn consensus(confidence: f64, agreement: f64) -> ConsensusSignal {
        ConsensusSignal {
            direction: 0.8,
            confidence,
            agreement_score: agreement,
            tags: vec![],
        }
    }

    #[test]
    fn buy_state_invalidates_below_entry_using_window_low() {
        let signals = vec![signal(Interval::M15, 0.7, 119.0, 99.9, 119.1)];
        let plan = build_trade_plan(SignalState::Buy, &consensus(0.9, 1.0), &signals, 1_000);
        assert_eq!(plan.entry_price, Some(119.0));
        assert!(plan.invalidation_price.unwrap() < 119.0);
        assert_eq!(plan.size_suggestion_pct, 2.0);
    }

    #[test]
    fn sell_state_invalidates_above_entry_using_window_high() {
        let signals = vec![signal(Interval::H1, -0.7, 90.0, 89.0, 120.0)];
        let plan = build_trade_plan(SignalState::Sell, &consensus(0.9, 1.0), &signals, 1_000);
        assert!(plan.invalidation_price.unwrap() > 90.0);
    }

    #[test]
    fn no_qualifying_horizon_yields_null_entry() {
        let plan = build_trade_plan(SignalState::Neutral, &consensus(0.0, 1.0), &[], 1_000);
        assert!(plan.entry_price.is_none());
        assert!(plan.invalidation_price.is_none());
    }

    #[test]
    fn longest_horizon_is_selected_as_primary() {
        let signals = vec![
            signal(Interval::M1, 0.5, 100.0, 99.0, 101.0),
            signal(Interval::D1, 0.5, 200.0, 190.0, 210.0),
        ];
        let plan = build_trade_plan(SignalState::Buy, &consensus(0.8, 1.0), &signals, 1_000);
        assert_eq!(plan.entry_price, Some(200.0));
    }

    #[test]
    fn validity_window_scales_with_primary_horizon() {
        let short = vec![signal(Interval::M1, 0.7, 100.0, 99.0, 101.0)];
        let long = vec![signal(Interval::D1, 0.7, 100.0, 99.0, 101.0)];
        let p_short = build_trade_plan(SignalState::Buy, &consensus(0.9, 1.0), &short, 0);
        let p_long = build_trade_plan(SignalState::Buy, &consensus(0.9, 1.0), &long, 0);
        assert!(p_short.valid_until_ts < p_long.valid_until_ts);
    }

    #[test]
    fn low_agreement_warning_present_when_agreement_below_half() {
        let signals = vec![signal(Interval::M15, 0.1, 100.0, 99.0, 101.0)];
        let plan = build_trade_plan(SignalState::Neutral, &consensus(0.5, 0.2), &signals, 0);
        assert!(plan.rationale.contains(&"low_agreement_warning".to_string()));
    }

    #[test]
    fn size_suggestion_matches_confidence_band_table() {
        assert_eq!(size_suggestion_pct(0.1), 0.25);
        assert_eq!(size_suggestion_pct(0.45), 0.5);
        assert_eq!(size_suggestion_pct(0.65), 1.0);
        assert_eq!(size_suggestion_pct(0.8), 1.5);
        assert_eq!(size_suggestion_pct(0.95), 2.0);
    }

    #[test]
    fn rationale_aggregates_state_position_and_sizing_tags() {
        let signals = vec![signal(Interval::M15, 0.7, 119.0, 99.9, 119.1)];
        let plan = build_trade_plan(SignalState::StrongBuy, &consensus(0.95, 1.0), &signals, 0);
        assert!(plan.rationale.contains(&"signal_strong_buy".to_string()));
        assert!(plan.rationale.contains(&"long_position".to_string()));
        assert!(plan.rationale.contains(&"size_maximal".to_string()));
    }

    #[test]
    fn neutral_state_yields_no_position_tag() {
        let plan = build_trade_plan(SignalState::Neutral, &consensus(0.3, 1.0), &[], 0);
        assert!(plan.rationale.contains(&"no_position_neutral".to_string()));
    }

    #[test]
    fn neutral_state_has_null_entry_even_with_a_primary_horizon() {
        let signals = vec![signal(Interval::M15, 0.1, 110.0, 100.0, 120.0)];
        let plan = build_trade_plan(SignalState::Neutral, &consensus(0.4, 0.3), &signals, 0);
        assert!(plan.entry_price.is_none());
        assert!(plan.invalidation_price.is_some());
    }
}
