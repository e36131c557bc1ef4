//! Asset and block handlers for vendors and the external-sync
//! collaborator.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::models::{Asset, AssetCategory, Block, BlockSource, CreateAsset, CreateBlock, UpdateAsset};
use crate::startup::AppState;

/// Request to register an asset.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateAssetRequest {
    pub vendor_id: Uuid,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    /// "vehicle" or "room".
    pub category: String,
    #[validate(range(min = 0))]
    pub daily_rate: i64,
    #[validate(range(min = 0))]
    pub hourly_rate: i64,
    #[validate(range(min = 0))]
    pub deposit_amount: Option<i64>,
    #[validate(range(min = 0, max = 130))]
    pub min_renter_age: Option<i32>,
    #[validate(range(min = 1))]
    pub capacity: Option<i32>,
}

/// Typed patch for asset updates.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateAssetRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    #[validate(range(min = 0))]
    pub daily_rate: Option<i64>,
    #[validate(range(min = 0))]
    pub hourly_rate: Option<i64>,
    #[validate(range(min = 0))]
    pub deposit_amount: Option<i64>,
    #[validate(range(min = 0, max = 130))]
    pub min_renter_age: Option<i32>,
    #[validate(range(min = 1))]
    pub capacity: Option<i32>,
    pub is_active: Option<bool>,
}

/// Request to block an asset's interval.
#[derive(Debug, Deserialize)]
pub struct CreateBlockRequest {
    pub start_utc: DateTime<Utc>,
    pub end_utc: DateTime<Utc>,
    pub reason: Option<String>,
    /// "vendor" (default) or "external_sync".
    pub source: Option<String>,
}

/// Availability pre-check query.
#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    pub start_utc: DateTime<Utc>,
    pub end_utc: DateTime<Utc>,
}

pub async fn create_asset(
    State(state): State<AppState>,
    Json(payload): Json<CreateAssetRequest>,
) -> Result<(StatusCode, Json<Asset>), AppError> {
    payload.validate()?;

    let category = AssetCategory::from_string(&payload.category).ok_or_else(|| {
        AppError::BadRequest(anyhow::anyhow!(
            "Unknown asset category '{}'",
            payload.category
        ))
    })?;

    let asset = state
        .db
        .create_asset(&CreateAsset {
            vendor_id: payload.vendor_id,
            name: payload.name,
            category,
            daily_rate: payload.daily_rate,
            hourly_rate: payload.hourly_rate,
            deposit_amount: payload.deposit_amount.unwrap_or(0),
            min_renter_age: payload.min_renter_age,
            capacity: payload.capacity,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(asset)))
}

pub async fn get_asset(
    State(state): State<AppState>,
    Path(asset_id): Path<Uuid>,
) -> Result<Json<Asset>, AppError> {
    let asset = state
        .db
        .get_asset(asset_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Asset not found")))?;

    Ok(Json(asset))
}

pub async fn update_asset(
    State(state): State<AppState>,
    Path(asset_id): Path<Uuid>,
    Json(payload): Json<UpdateAssetRequest>,
) -> Result<Json<Asset>, AppError> {
    payload.validate()?;

    let asset = state
        .db
        .update_asset(
            asset_id,
            &UpdateAsset {
                name: payload.name,
                daily_rate: payload.daily_rate,
                hourly_rate: payload.hourly_rate,
                deposit_amount: payload.deposit_amount,
                min_renter_age: payload.min_renter_age,
                capacity: payload.capacity,
                is_active: payload.is_active,
            },
        )
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Asset not found")))?;

    Ok(Json(asset))
}

/// Overlap pre-check for the search/quote surface.
pub async fn check_availability(
    State(state): State<AppState>,
    Path(asset_id): Path<Uuid>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    if query.end_utc <= query.start_utc {
        return Err(AppError::InvalidWindow(
            "end_utc must be after start_utc".to_string(),
        ));
    }

    state
        .db
        .get_asset(asset_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Asset not found")))?;

    let available = state
        .db
        .is_available(asset_id, query.start_utc, query.end_utc)
        .await?;

    Ok(Json(serde_json::json!({ "available": available })))
}

pub async fn create_block(
    State(state): State<AppState>,
    Path(asset_id): Path<Uuid>,
    Json(payload): Json<CreateBlockRequest>,
) -> Result<(StatusCode, Json<Block>), AppError> {
    if payload.end_utc <= payload.start_utc {
        return Err(AppError::InvalidWindow(
            "end_utc must be after start_utc".to_string(),
        ));
    }

    let source = match payload.source.as_deref() {
        None | Some("vendor") => BlockSource::Vendor,
        Some("external_sync") => BlockSource::ExternalSync,
        Some(other) => {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Unknown block source '{}'",
                other
            )));
        }
    };

    let block = state
        .db
        .create_block(&CreateBlock {
            asset_id,
            start_utc: payload.start_utc,
            end_utc: payload.end_utc,
            reason: payload.reason,
            source,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(block)))
}

pub async fn deactivate_block(
    State(state): State<AppState>,
    Path(block_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let removed = state.db.deactivate_block(block_id).await?;
    if !removed {
        return Err(AppError::NotFound(anyhow::anyhow!("Block not found")));
    }

    Ok(StatusCode::NO_CONTENT)
}
