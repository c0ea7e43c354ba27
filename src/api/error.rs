// =============================================================================
// API Error Type
// =============================================================================
//
// Unifies the two failure modes a read-only endpoint can hit (spec §7):
// input validation (HTTP 400, machine-readable reason) and store
// unavailability (HTTP 500). Handlers return `Result<_, ApiError>` and this
// converts to the JSON error body via `IntoResponse`.
// =============================================================================

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("bar store unavailable: {0}")]
    StoreUnavailable(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            ApiError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::StoreUnavailable(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "bar store unavailable".to_string())
            }
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}
