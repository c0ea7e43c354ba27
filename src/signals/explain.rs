// =============================================================================
// Explainability Layer
// =============================================================================
//
// Expands the rationale tags accumulated by the horizon, consensus, and
// state stages into three ordered prose sequences — drivers, risks, notes —
// plus a structured confidence breakdown, and optionally a full debug trace
// of the per-horizon intermediates (spec §3 Explanation, §4.9). Purely
// presentational: it never recomputes anything the earlier stages already
// decided.
// =============================================================================

use serde::Serialize;

use crate::market_model::Interval;

use super::consensus::ConsensusSignal;
use super::features::FeatureSet;
use super::horizon::HorizonSignal;
use super::plan::TradePlan;
use super::state::SignalState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagCategory {
    Driver,
    Risk,
    Note,
}

/// Static tag -> (category, sentence) taxonomy. Horizon-prefixed tags
/// (e.g. `1h_strong_bullish`) are matched after stripping the horizon
/// label, so one entry covers the tag across every horizon.
fn classify(tag: &str) -> (TagCategory, String) {
    if let Some(rest) = strip_horizon_prefix(tag) {
        return classify_horizon_tag(tag, rest);
    }

    match tag {
        "strong_agreement" => (TagCategory::Driver, "Horizons strongly agree with each other.".to_string()),
        "moderate_agreement" => (TagCategory::Note, "Horizons moderately agree with each other.".to_string()),
        "weak_agreement" => (TagCategory::Risk, "Horizons show weak agreement.".to_string()),
        "conflicting_signals" => (TagCategory::Risk, "Short-term and long-term horizons are in conflict.".to_string()),
        "majority_bullish" => (TagCategory::Driver, "A majority of analysed horizons are bullish.".to_string()),
        "majority_bearish" => (TagCategory::Driver, "A majority of analysed horizons are bearish.".to_string()),
        "mixed_directions" => (TagCategory::Risk, "Analysed horizons point in mixed directions.".to_string()),
        "short_term_bullish_long_term_bearish" => (
            TagCategory::Risk,
            "Short-term horizons are bullish while long-term horizons are bearish.".to_string(),
        ),
        "short_term_bearish_long_term_bullish" => (
            TagCategory::Risk,
            "Short-term horizons are bearish while long-term horizons are bullish.".to_string(),
        ),
        "high_confidence_signal" => (TagCategory::Driver, "Overall confidence in this read is high.".to_string()),
        "low_confidence_signal" => (TagCategory::Risk, "Overall confidence in this read is low.".to_string()),
        "low_agreement_warning" => (TagCategory::Risk, "The trade plan is built on low horizon agreement.".to_string()),
        "no_data" => (TagCategory::Note, "No bar data was available for any analysed horizon.".to_string()),
        "long_position" => (TagCategory::Driver, "The plan describes a long position.".to_string()),
        "short_position" => (TagCategory::Driver, "The plan describes a short position.".to_string()),
        "no_position_neutral" => (TagCategory::Note, "No position is suggested while the read stays neutral.".to_string()),
        "size_minimal" => (TagCategory::Risk, "Suggested position size is minimal given the confidence level.".to_string()),
        "size_small" => (TagCategory::Note, "Suggested position size is small given the confidence level.".to_string()),
        "size_standard" => (TagCategory::Note, "Suggested position size is standard given the confidence level.".to_string()),
        "size_elevated" => (TagCategory::Driver, "Suggested position size is elevated given the confidence level.".to_string()),
        "size_maximal" => (TagCategory::Driver, "Suggested position size is maximal given the confidence level.".to_string()),
        other if other.starts_with("signal_") => {
            (TagCategory::Note, format!("Consensus state resolved to {}.", other.trim_start_matches("signal_")))
        }
        other => (TagCategory::Note, format!("Observed condition: {other}.")),
    }
}

fn strip_horizon_prefix(tag: &str) -> Option<&str> {
    for interval in Interval::ALL {
        let prefix = format!("{}_", interval.as_str());
        if let Some(rest) = tag.strip_prefix(prefix.as_str()) {
            return Some(rest);
        }
    }
    None
}

fn classify_horizon_tag(full_tag: &str, rest: &str) -> (TagCategory, String) {
    let horizon = full_tag.split('_').next().unwrap_or("");
    match rest {
        "strong_bullish" => (TagCategory::Driver, format!("{horizon} shows strong bullish momentum.")),
        "weak_bullish" => (TagCategory::Note, format!("{horizon} shows weak bullish momentum.")),
        "neutral" => (TagCategory::Note, format!("{horizon} is directionless.")),
        "weak_bearish" => (TagCategory::Note, format!("{horizon} shows weak bearish momentum.")),
        "strong_bearish" => (TagCategory::Driver, format!("{horizon} shows strong bearish momentum.")),
        "high_volatility" => (TagCategory::Risk, format!("{horizon} volatility is elevated.")),
        "low_volatility" => (TagCategory::Note, format!("{horizon} volatility is low.")),
        "high_confidence" => (TagCategory::Note, format!("{horizon} data quality is high.")),
        "low_confidence" => (TagCategory::Risk, format!("{horizon} data quality is low.")),
        _ => (TagCategory::Note, format!("{full_tag}.")),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Explanation {
    pub drivers: Vec<String>,
    pub risks: Vec<String>,
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfidenceBreakdown {
    /// Overall consensus confidence (spec §4.9: equals `consensus.confidence`).
    pub total: f64,
    /// Mean per-horizon confidence — how much raw data backed this read.
    pub data_quality: f64,
    /// Consensus agreement score.
    pub agreement: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DebugTrace {
    pub per_horizon_features: Vec<(Interval, FeatureSet)>,
    pub per_horizon_direction: Vec<(Interval, f64)>,
    pub per_horizon_confidence: Vec<(Interval, f64)>,
    pub consensus_direction: f64,
    pub consensus_confidence: f64,
    pub consensus_agreement: f64,
    pub tags: Vec<String>,
    pub note: &'static str,
}

/// Build the full explanation for a `/v1/signal` response (spec §4.9).
pub fn explain_response(
    _state: SignalState,
    state_tags: &[String],
    consensus: &ConsensusSignal,
    horizons: &[HorizonSignal],
    plan: &TradePlan,
    include_debug: bool,
) -> Explanation {
    let mut all_tags: Vec<String> = Vec::new();
    all_tags.extend(state_tags.iter().cloned());
    all_tags.extend(consensus.tags.iter().cloned());
    for h in horizons {
        all_tags.extend(h.rationale.iter().cloned());
    }
    all_tags.extend(plan.rationale.iter().cloned());
    all_tags.dedup();

    let mut drivers = Vec::new();
    let mut risks = Vec::new();
    let mut notes = Vec::new();

    for tag in &all_tags {
        let (category, sentence) = classify(tag);
        match category {
            TagCategory::Driver => drivers.push(sentence),
            TagCategory::Risk => risks.push(sentence),
            TagCategory::Note => notes.push(sentence),
        }
    }

    let _ = include_debug; // debug trace is built separately via `build_debug_trace`.

    Explanation { drivers, risks, notes }
}

pub fn confidence_breakdown(consensus: &ConsensusSignal, horizons: &[HorizonSignal]) -> ConfidenceBreakdown {
    let data_quality = if horizons.is_empty() {
        0.0
    } else {
        horizons.iter().map(|h| h.confidence).sum::<f64>() / horizons.len() as f64
    };

    ConfidenceBreakdown {
        total: consensus.confidence,
        data_quality,
        agreement: consensus.agreement_score,
    }
}

pub fn build_debug_trace(consensus: &ConsensusSignal, horizons: &[HorizonSignal]) -> DebugTrace {
    DebugTrace {
        per_horizon_features: horizons.iter().map(|h| (h.interval, h.features.clone())).collect(),
        per_horizon_direction: horizons.iter().map(|h| (h.interval, h.direction_score)).collect(),
        per_horizon_confidence: horizons.iter().map(|h| (h.interval, h.confidence)).collect(),
        consensus_direction: consensus.direction,
        consensus_confidence: consensus.confidence,
        consensus_agreement: consensus.agreement_score,
        tags: consensus.tags.clone(),
        note: "no recalculation performed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::features::FeatureSet;

    fn consensus() -> ConsensusSignal {
        ConsensusSignal {
            direction: 0.8,
            confidence: 0.9,
            agreement_score: 1.0,
            tags: vec!["strong_agreement".to_string(), "majority_bullish".to_string()],
        }
    }

    fn plan() -> TradePlan {
        TradePlan {
            state: SignalState::StrongBuy,
            confidence: 0.9,
            entry_price: Some(100.0),
            invalidation_price: Some(98.0),
            valid_until_ts: 2_000,
            size_suggestion_pct: 2.0,
            rationale: vec![],
            horizons_analyzed: vec![Interval::H1],
        }
    }

    fn horizon() -> HorizonSignal {
        HorizonSignal {
            interval: Interval::H1,
            direction_score: 0.8,
            strength: 0.8,
            confidence: 0.9,
            rationale: vec!["1h_strong_bullish".to_string(), "1h_high_confidence".to_string()],
            features: FeatureSet {
                n_bars: 20,
                momentum: 0.8,
                volatility: 0.01,
                trend_direction: 1,
                stability: 0.9,
                avg_range: 1.0,
            },
            last_close: 100.0,
            window_min_low: 95.0,
            window_max_high: 105.0,
        }
    }

    #[test]
    fn drivers_risks_notes_are_partitioned() {
        let state_tags = vec!["signal_strong_buy".to_string(), "high_confidence_signal".to_string()];
        let horizons = vec![horizon()];
        let e = explain_response(SignalState::StrongBuy, &state_tags, &consensus(), &horizons, &plan(), false);
        assert!(e.drivers.iter().any(|s| s.contains("bullish momentum")));
        assert!(e.drivers.iter().any(|s| s.contains("strongly agree")));
        assert!(e.risks.is_empty());
    }

    #[test]
    fn conflict_tag_lands_in_risks() {
        let mut c = consensus();
        c.tags.push("short_term_bullish_long_term_bearish".to_string());
        let e = explain_response(SignalState::Neutral, &[], &c, &[], &plan(), false);
        assert!(e.risks.iter().any(|s| s.contains("Short-term")));
    }

    #[test]
    fn confidence_breakdown_reports_fixed_fields() {
        let horizons = vec![horizon()];
        let b = confidence_breakdown(&consensus(), &horizons);
        assert_eq!(b.total, 0.9);
        assert_eq!(b.data_quality, 0.9);
        assert_eq!(b.agreement, 1.0);
    }

    #[test]
    fn debug_trace_carries_fixed_note() {
        let horizons = vec![horizon()];
        let trace = build_debug_trace(&consensus(), &horizons);
        assert_eq!(trace.note, "no recalculation performed");
        assert_eq!(trace.per_horizon_features.len(), 1);
    }
}
