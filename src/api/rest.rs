// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// Every endpoint is read-only and unauthenticated (spec §6): there is
// nothing here an attacker can use to place an order, since this crate
// never places one. CORS is configured permissively, matching the
// original service's development posture.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Json, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

use crate::api::error::ApiError;
use crate::app_state::AppState;
use crate::market_model::{Bar, Interval};
use crate::signals;

/// Hard ceiling on `/v1/bars?limit=`, independent of what the caller asks for.
const MAX_BARS_LIMIT: usize = 1_000;
/// Hard floor on `/v1/bars?limit=`.
const MIN_BARS_LIMIT: usize = 1;

/// Floor on `/v1/signal` `bar_limit`.
const MIN_SIGNAL_BAR_LIMIT: usize = 20;
/// Ceiling on `/v1/signal` `bar_limit`.
const MAX_SIGNAL_BAR_LIMIT: usize = 500;

// =============================================================================
// Router construction
// =============================================================================

/// Build the full REST API router with CORS middleware and shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/v1/providers", get(providers))
        .route("/v1/bars", get(bars))
        .route("/v1/meta/instruments", get(instruments))
        .route("/v1/signal", post(signal))
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// GET /health
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    ok: bool,
    ts: i64,
    provider: &'static str,
}

async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        ok: true,
        ts: chrono::Utc::now().timestamp(),
        provider: "binance",
    })
}

// =============================================================================
// GET /v1/providers
// =============================================================================

async fn providers(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.supervisor.status())
}

// =============================================================================
// GET /v1/bars
// =============================================================================

#[derive(Deserialize)]
struct BarsQuery {
    symbol: String,
    interval: String,
    #[serde(default)]
    limit: Option<usize>,
}

async fn bars(
    State(state): State<Arc<AppState>>,
    Query(q): Query<BarsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let interval = Interval::parse(&q.interval)
        .ok_or_else(|| ApiError::InvalidRequest(format!("unknown interval '{}'", q.interval)))?;

    let limit = q.limit.unwrap_or(MAX_BARS_LIMIT).clamp(MIN_BARS_LIMIT, MAX_BARS_LIMIT);

    let rows: Vec<Bar> = state.store.recent(&q.symbol, interval, limit).map_err(|e| {
        warn!(error = %e, "bar store read failed");
        ApiError::StoreUnavailable(e)
    })?;

    Ok(Json(rows))
}

// =============================================================================
// GET /v1/meta/instruments
// =============================================================================

#[derive(Deserialize)]
struct InstrumentsQuery {
    #[serde(default)]
    min_bars_1m: Option<u64>,
}

#[derive(Serialize)]
struct InstrumentMeta {
    symbol: String,
    bars_1m: u64,
}

async fn instruments(
    State(state): State<Arc<AppState>>,
    Query(q): Query<InstrumentsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let symbols = state.store.symbols().map_err(|e| {
        warn!(error = %e, "bar store read failed");
        ApiError::StoreUnavailable(e)
    })?;

    let min_bars = q.min_bars_1m.unwrap_or(0);
    let mut out = Vec::new();
    for symbol in symbols {
        let count = state.store.count(&symbol, Interval::M1).map_err(|e| {
            warn!(error = %e, "bar store count failed");
            ApiError::StoreUnavailable(e)
        })?;
        if count >= min_bars {
            out.push(InstrumentMeta { symbol, bars_1m: count });
        }
    }

    Ok(Json(out))
}

// =============================================================================
// POST /v1/signal
// =============================================================================

#[derive(Deserialize)]
struct SignalRequest {
    symbol: String,
    #[serde(default)]
    horizons: Option<Vec<String>>,
    #[serde(default)]
    bar_limit: Option<usize>,
    #[serde(default)]
    explain: bool,
    #[serde(default)]
    debug: bool,
}

#[derive(Serialize)]
struct SignalResponse {
    symbol: String,
    state: signals::SignalState,
    confidence: f64,
    agreement_score: f64,
    horizons_analyzed: Vec<Interval>,
    plan: signals::TradePlan,
    tags: Vec<String>,
    explanation: Option<signals::Explanation>,
    confidence_breakdown: Option<signals::ConfidenceBreakdown>,
    debug: Option<signals::DebugTrace>,
}

async fn signal(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SignalRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.symbol.trim().is_empty() {
        return Err(ApiError::InvalidRequest("symbol must not be empty".to_string()));
    }

    let bar_limit = req
        .bar_limit
        .unwrap_or(MAX_SIGNAL_BAR_LIMIT)
        .clamp(MIN_SIGNAL_BAR_LIMIT, MAX_SIGNAL_BAR_LIMIT);

    let requested_intervals: Vec<Interval> = match &req.horizons {
        Some(labels) => {
            let mut parsed = Vec::with_capacity(labels.len());
            for label in labels {
                let interval = Interval::parse(label)
                    .ok_or_else(|| ApiError::InvalidRequest(format!("unknown horizon '{label}'")))?;
                parsed.push(interval);
            }
            parsed
        }
        None => Interval::DEFAULT_HORIZONS.to_vec(),
    };

    // Never let an analytical panic escape as a 5xx (spec §7): every
    // per-horizon read/compute step degrades to "skip this horizon"
    // instead of propagating an error.
    let mut horizon_signals = Vec::new();
    for interval in &requested_intervals {
        let rows = match state.store.recent(&req.symbol, *interval, bar_limit) {
            Ok(rows) => rows,
            Err(e) => {
                warn!(error = %e, symbol = %req.symbol, %interval, "bar store read failed for horizon");
                continue;
            }
        };
        if rows.is_empty() {
            continue;
        }
        horizon_signals.push(signals::build_horizon_signal(*interval, &rows));
    }

    let consensus = signals::build_consensus(&horizon_signals);
    let (state_enum, state_tags) = signals::map_state(&consensus);
    let now_ts = chrono::Utc::now().timestamp();
    let plan = signals::build_trade_plan(state_enum, &consensus, &horizon_signals, now_ts);

    let mut tags = state_tags.clone();
    tags.extend(consensus.tags.iter().cloned());
    tags.extend(plan.rationale.iter().cloned());
    if horizon_signals.is_empty() {
        tags.push("no_data".to_string());
    }
    tags.dedup();

    let explanation = if req.explain {
        Some(signals::explain_response(state_enum, &state_tags, &consensus, &horizon_signals, &plan, req.debug))
    } else {
        None
    };
    let confidence_breakdown = if req.explain {
        Some(signals::confidence_breakdown(&consensus, &horizon_signals))
    } else {
        None
    };
    let debug = if req.debug {
        Some(signals::build_debug_trace(&consensus, &horizon_signals))
    } else {
        None
    };

    Ok(Json(SignalResponse {
        symbol: req.symbol.to_uppercase(),
        state: state_enum,
        confidence: consensus.confidence,
        agreement_score: consensus.agreement_score,
        horizons_analyzed: plan.horizons_analyzed.clone(),
        plan,
        tags,
        explanation,
        confidence_breakdown,
        debug,
    }))
}
