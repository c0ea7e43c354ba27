// =============================================================================
// Signal Engine
// =============================================================================
//
// Pure, deterministic per-request pipeline: bars -> features -> per-horizon
// confidence/direction -> weighted consensus -> discrete state -> trade plan
// -> human-readable explanation. Nothing here is async and nothing here
// touches the store or the network (spec §4.3-§4.9: "All analytical
// functions are pure and synchronous").
// =============================================================================

pub mod confidence;
pub mod consensus;
pub mod explain;
pub mod features;
pub mod horizon;
pub mod plan;
pub mod state;

pub use confidence::score_confidence;
pub use consensus::{build_consensus, ConsensusSignal};
pub use explain::{build_debug_trace, confidence_breakdown, explain_response, ConfidenceBreakdown, DebugTrace, Explanation};
pub use features::{extract_features, FeatureSet};
pub use horizon::{build_horizon_signal, HorizonSignal};
pub use plan::{build_trade_plan, TradePlan};
pub use state::{map_state, SignalState};
