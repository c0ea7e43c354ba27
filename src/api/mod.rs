// =============================================================================
// HTTP API
// =============================================================================
//
// Thin Axum layer over the bar store and signal engine (spec §6). No
// authentication: every endpoint is read-only and nothing here can place
// an order or mutate ingestion state.
// =============================================================================

pub mod error;
pub mod rest;
