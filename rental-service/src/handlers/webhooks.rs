//! Payment gateway callback handler.

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode},
};
use serde_json::json;
use service_core::error::AppError;

use crate::startup::AppState;

pub const SIGNATURE_HEADER: &str = "x-gateway-signature";

/// Receive a signed gateway callback.
///
/// Success (2xx) is returned for every event that ends up durably
/// recorded as handled — including idempotent replays and events
/// flagged for manual review — so the gateway stops redelivering.
/// Only a missing/invalid signature or a malformed payload rejects.
pub async fn payment_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            tracing::warn!("Missing {} header", SIGNATURE_HEADER);
            AppError::SignatureInvalid
        })?;

    let outcome = state.processor.process(&body, signature).await?;

    Ok((StatusCode::OK, Json(json!({ "status": outcome.as_str() }))))
}
