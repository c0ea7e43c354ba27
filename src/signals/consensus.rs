// =============================================================================
// Consensus Builder
// =============================================================================
//
// Combines the per-horizon signals into one weighted verdict (spec §4.6).
// Direction is a confidence- and importance-weighted average; confidence is
// the arithmetic mean of per-horizon confidence damped by an agreement
// score, so unanimous horizons read as more trustworthy than the same
// average confidence spread across horizons that disagree.
// =============================================================================

use crate::market_model::Interval;

use super::horizon::HorizonSignal;

/// Static importance weight per horizon (spec §6 `HORIZON_WEIGHTS`).
/// Longer horizons carry more weight; this is a raw multiplier, not a
/// probability distribution, so it does not need to sum to 1.0.
pub fn horizon_weight(interval: Interval) -> f64 {
    match interval {
        Interval::M1 => 0.5,
        Interval::M5 => 0.8,
        Interval::M15 => 1.0,
        Interval::H1 => 1.5,
        Interval::H4 => 2.0,
        Interval::D1 => 2.5,
        Interval::W1 => 3.0,
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ConsensusSignal {
    pub direction: f64,
    pub confidence: f64,
    pub agreement_score: f64,
    pub tags: Vec<String>,
}

/// Build consensus from a set of per-horizon signals (spec §4.6).
pub fn build_consensus(signals: &[HorizonSignal]) -> ConsensusSignal {
    if signals.is_empty() {
        return ConsensusSignal {
            direction: 0.0,
            confidence: 0.0,
            agreement_score: 1.0,
            tags: vec!["no_data".to_string()],
        };
    }

    let mut direction_num = 0.0;
    let mut direction_den = 0.0;
    for s in signals {
        let w = horizon_weight(s.interval);
        direction_num += s.direction_score * s.confidence * w;
        direction_den += s.confidence * w;
    }
    let direction = if direction_den > 0.0 { direction_num / direction_den } else { 0.0 };

    let mean_confidence = signals.iter().map(|s| s.confidence).sum::<f64>() / signals.len() as f64;
    let agreement_score = agreement(signals);
    let confidence = (mean_confidence * agreement_score).clamp(0.0, 1.0);

    let mut tags = build_conflict_tags(signals);
    tags.extend(agreement_tags(agreement_score, signals));

    ConsensusSignal {
        direction,
        confidence,
        agreement_score,
        tags,
    }
}

fn sign(x: f64) -> i8 {
    if x > 1e-9 {
        1
    } else if x < -1e-9 {
        -1
    } else {
        0
    }
}

/// `agreement = 1 - 2 * min(pos, neg) / total_nonzero`, clamped `[0, 1]`.
/// Zero-direction horizons are dropped before counting; if none remain,
/// agreement defaults to 1.0 (spec §4.6).
fn agreement(signals: &[HorizonSignal]) -> f64 {
    let (mut pos, mut neg) = (0usize, 0usize);
    for s in signals {
        match sign(s.direction_score) {
            1 => pos += 1,
            -1 => neg += 1,
            _ => {}
        }
    }
    let total_nonzero = pos + neg;
    if total_nonzero == 0 {
        return 1.0;
    }
    (1.0 - 2.0 * (pos.min(neg) as f64) / (total_nonzero as f64)).clamp(0.0, 1.0)
}

fn agreement_tags(agreement_score: f64, signals: &[HorizonSignal]) -> Vec<String> {
    let mut tags = Vec::new();

    if agreement_score >= 0.8 {
        tags.push("strong_agreement".to_string());
    } else if agreement_score >= 0.5 {
        tags.push("moderate_agreement".to_string());
    } else {
        tags.push("weak_agreement".to_string());
    }

    let (mut pos, mut neg) = (0usize, 0usize);
    for s in signals {
        match sign(s.direction_score) {
            1 => pos += 1,
            -1 => neg += 1,
            _ => {}
        }
    }

    if agreement_score < 0.5 && pos > 0 && neg > 0 {
        tags.push("conflicting_signals".to_string());
    }

    if pos > 0 && neg == 0 {
        tags.push("majority_bullish".to_string());
    } else if neg > 0 && pos == 0 {
        tags.push("majority_bearish".to_string());
    } else if pos > 0 && neg > 0 {
        tags.push("mixed_directions".to_string());
    }

    tags
}

/// Flags disagreement between the short-term (1m/5m/15m) and long-term
/// (1h/4h/1d/1w) horizon groups (spec §4.6).
fn build_conflict_tags(signals: &[HorizonSignal]) -> Vec<String> {
    let short_sign = dominant_sign(signals.iter().filter(|s| s.interval.is_short_term()));
    let long_sign = dominant_sign(signals.iter().filter(|s| s.interval.is_long_term()));

    match (short_sign, long_sign) {
        (Some(1), Some(-1)) => vec!["short_term_bullish_long_term_bearish".to_string()],
        (Some(-1), Some(1)) => vec!["short_term_bearish_long_term_bullish".to_string()],
        _ => Vec::new(),
    }
}

fn dominant_sign<'a>(it: impl Iterator<Item = &'a HorizonSignal>) -> Option<i8> {
    let mut total = 0.0;
    let mut any = false;
    for s in it {
        total += s.direction_score;
        any = true;
    }
    if !any {
        return None;
    }
    Some(sign(total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::features::FeatureSet;

    fn signal(interval: Interval, direction_score: f64, confidence: f64) -> HorizonSignal {
        HorizonSignal {
            interval,
            direction_score,
            strength: direction_score.abs(),
            confidence,
            rationale: vec![],
            features: FeatureSet {
                n_bars: 20,
                momentum: direction_score,
                volatility: 0.0,
                trend_direction: sign(direction_score),
                stability: 1.0,
                avg_range: 1.0,
            },
            last_close: 100.0,
            window_min_low: 99.0,
            window_max_high: 101.0,
        }
    }

    #[test]
    fn empty_input_is_no_data() {
        let c = build_consensus(&[]);
        assert_eq!(c.direction, 0.0);
        assert!(c.tags.contains(&"no_data".to_string()));
    }

    #[test]
    fn unanimous_bullish_has_full_agreement() {
        let signals = vec![
            signal(Interval::M15, 0.7, 0.9),
            signal(Interval::H1, 0.6, 0.9),
            signal(Interval::H4, 0.8, 0.9),
        ];
        let c = build_consensus(&signals);
        assert!(c.direction > 0.5);
        assert_eq!(c.agreement_score, 1.0);
        assert!(c.tags.contains(&"strong_agreement".to_string()));
        assert!(c.tags.contains(&"majority_bullish".to_string()));
    }

    #[test]
    fn short_long_conflict_is_flagged() {
        let signals = vec![
            signal(Interval::M1, 0.8, 0.9),
            signal(Interval::M5, 0.7, 0.9),
            signal(Interval::H4, -0.8, 0.9),
            signal(Interval::D1, -0.7, 0.9),
        ];
        let c = build_consensus(&signals);
        assert!(c.tags.contains(&"short_term_bullish_long_term_bearish".to_string()));
        assert!(c.tags.contains(&"conflicting_signals".to_string()));
        assert!(c.agreement_score < 0.5);
    }

    #[test]
    fn zero_confidence_horizons_do_not_skew_direction() {
        let signals = vec![signal(Interval::H1, 1.0, 0.0), signal(Interval::H4, -0.5, 0.9)];
        let c = build_consensus(&signals);
        assert!(c.direction < 0.0);
    }

    #[test]
    fn confidence_is_mean_times_agreement_not_weighted_mean() {
        let signals = vec![signal(Interval::M15, 0.6, 0.8), signal(Interval::H1, -0.6, 0.4)];
        let c = build_consensus(&signals);
        let expected_mean = (0.8 + 0.4) / 2.0;
        assert!((c.confidence - expected_mean * c.agreement_score).abs() < 1e-9);
    }
}
