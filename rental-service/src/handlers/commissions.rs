//! Administrative commission rate configuration.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::models::{CommissionRate, CreateCommissionRate, UpdateCommissionRate};
use crate::startup::AppState;

/// Request to create a commission rate. Omit both `vendor_id` and
/// `category` for the global default; resolution precedence is
/// vendor-specific > category-specific > global.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateCommissionRateRequest {
    pub vendor_id: Option<Uuid>,
    pub category: Option<String>,
    #[validate(range(min = 0, max = 100))]
    pub percent: i32,
    pub effective_from: Option<DateTime<Utc>>,
    pub effective_until: Option<DateTime<Utc>>,
}

/// Typed patch for commission rate updates.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateCommissionRateRequest {
    #[validate(range(min = 0, max = 100))]
    pub percent: Option<i32>,
    pub is_active: Option<bool>,
    pub effective_from: Option<DateTime<Utc>>,
    pub effective_until: Option<DateTime<Utc>>,
}

pub async fn create_rate(
    State(state): State<AppState>,
    Json(payload): Json<CreateCommissionRateRequest>,
) -> Result<(StatusCode, Json<CommissionRate>), AppError> {
    payload.validate()?;

    if let (Some(from), Some(until)) = (payload.effective_from, payload.effective_until) {
        if until <= from {
            return Err(AppError::InvalidWindow(
                "effective_until must be after effective_from".to_string(),
            ));
        }
    }

    let rate = state
        .db
        .create_commission_rate(&CreateCommissionRate {
            vendor_id: payload.vendor_id,
            category: payload.category,
            percent: payload.percent,
            effective_from: payload.effective_from,
            effective_until: payload.effective_until,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(rate)))
}

pub async fn list_rates(
    State(state): State<AppState>,
) -> Result<Json<Vec<CommissionRate>>, AppError> {
    Ok(Json(state.db.list_commission_rates().await?))
}

pub async fn update_rate(
    State(state): State<AppState>,
    Path(rate_id): Path<Uuid>,
    Json(payload): Json<UpdateCommissionRateRequest>,
) -> Result<Json<CommissionRate>, AppError> {
    payload.validate()?;

    let rate = state
        .db
        .update_commission_rate(
            rate_id,
            &UpdateCommissionRate {
                percent: payload.percent,
                is_active: payload.is_active,
                effective_from: payload.effective_from,
                effective_until: payload.effective_until,
            },
        )
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Commission rate not found")))?;

    Ok(Json(rate))
}

pub async fn delete_rate(
    State(state): State<AppState>,
    Path(rate_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let deleted = state.db.delete_commission_rate(rate_id).await?;
    if !deleted {
        return Err(AppError::NotFound(anyhow::anyhow!(
            "Commission rate not found"
        )));
    }

    Ok(StatusCode::NO_CONTENT)
}
