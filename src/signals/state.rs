// =============================================================================
// Discrete State Mapper
// =============================================================================
//
// Collapses the consensus's continuous weighted direction into one of five
// discrete states using the fixed boundaries from spec §4.7.
// =============================================================================

use serde::Serialize;

use super::consensus::ConsensusSignal;

/// Boundary above which a direction is "strong" rather than merely
/// directional (spec §4.7).
pub const STRONG_BOUNDARY: f64 = 0.65;
/// Boundary above which a direction counts as directional at all.
pub const WEAK_BOUNDARY: f64 = 0.20;

/// Confidence at/above which a `high_confidence_signal` tag is attached.
pub const HIGH_CONFIDENCE_BOUNDARY: f64 = 0.75;
/// Confidence at/below which a `low_confidence_signal` tag is attached.
pub const LOW_CONFIDENCE_BOUNDARY: f64 = 0.4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalState {
    StrongBuy,
    Buy,
    Neutral,
    Sell,
    StrongSell,
}

impl SignalState {
    /// Lowercase tag form, e.g. `signal_strong_buy`.
    pub fn tag(self) -> String {
        let suffix = match self {
            SignalState::StrongBuy => "strong_buy",
            SignalState::Buy => "buy",
            SignalState::Neutral => "neutral",
            SignalState::Sell => "sell",
            SignalState::StrongSell => "strong_sell",
        };
        format!("signal_{suffix}")
    }
}

/// Map a consensus signal to a discrete state plus the tags that
/// accompany it (spec §4.7: `signal_<state>` plus confidence-band tags).
pub fn map_state(consensus: &ConsensusSignal) -> (SignalState, Vec<String>) {
    let d = consensus.direction;
    let state = if d >= STRONG_BOUNDARY {
        SignalState::StrongBuy
    } else if d >= WEAK_BOUNDARY {
        SignalState::Buy
    } else if d <= -STRONG_BOUNDARY {
        SignalState::StrongSell
    } else if d <= -WEAK_BOUNDARY {
        SignalState::Sell
    } else {
        SignalState::Neutral
    };

    let mut tags = vec![state.tag()];
    if consensus.confidence >= HIGH_CONFIDENCE_BOUNDARY {
        tags.push("high_confidence_signal".to_string());
    } else if consensus.confidence <= LOW_CONFIDENCE_BOUNDARY {
        tags.push("low_confidence_signal".to_string());
    }

    (state, tags)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn consensus(direction: f64, confidence: f64) -> ConsensusSignal {
        ConsensusSignal {
            direction,
            confidence,
            agreement_score: 1.0,
            tags: vec![],
        }
    }

    #[test]
    fn boundaries_map_to_expected_states() {
        assert_eq!(map_state(&consensus(0.9, 0.5)).0, SignalState::StrongBuy);
        assert_eq!(map_state(&consensus(0.65, 0.5)).0, SignalState::StrongBuy);
        assert_eq!(map_state(&consensus(0.3, 0.5)).0, SignalState::Buy);
        assert_eq!(map_state(&consensus(0.0, 0.5)).0, SignalState::Neutral);
        assert_eq!(map_state(&consensus(-0.3, 0.5)).0, SignalState::Sell);
        assert_eq!(map_state(&consensus(-0.9, 0.5)).0, SignalState::StrongSell);
    }

    #[test]
    fn high_confidence_tag_attached_above_threshold() {
        let (_, tags) = map_state(&consensus(0.8, 0.85));
        assert!(tags.contains(&"high_confidence_signal".to_string()));
    }

    #[test]
    fn low_confidence_tag_attached_at_and_below_threshold() {
        let (_, tags) = map_state(&consensus(0.8, 0.4));
        assert!(tags.contains(&"low_confidence_signal".to_string()));
        let (_, tags) = map_state(&consensus(0.8, 0.2));
        assert!(tags.contains(&"low_confidence_signal".to_string()));
    }

    #[test]
    fn state_tag_format() {
        assert_eq!(SignalState::StrongBuy.tag(), "signal_strong_buy");
        assert_eq!(SignalState::Neutral.tag(), "signal_neutral");
    }
}
