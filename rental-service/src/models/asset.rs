//! Rentable asset model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Asset category. Determines which eligibility constraint applies at
/// hold creation: minimum renter age for vehicles, capacity for rooms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetCategory {
    Vehicle,
    Room,
}

impl AssetCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetCategory::Vehicle => "vehicle",
            AssetCategory::Room => "room",
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        match s {
            "vehicle" => Some(AssetCategory::Vehicle),
            "room" => Some(AssetCategory::Room),
            _ => None,
        }
    }
}

/// A rentable unit. Soft-deactivated, never deleted while bookings
/// reference it.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Asset {
    pub asset_id: Uuid,
    pub vendor_id: Uuid,
    pub name: String,
    pub category: String,
    pub daily_rate: i64,
    pub hourly_rate: i64,
    pub deposit_amount: i64,
    pub min_renter_age: Option<i32>,
    pub capacity: Option<i32>,
    pub is_active: bool,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

/// Input for creating an asset.
#[derive(Debug, Clone)]
pub struct CreateAsset {
    pub vendor_id: Uuid,
    pub name: String,
    pub category: AssetCategory,
    pub daily_rate: i64,
    pub hourly_rate: i64,
    pub deposit_amount: i64,
    pub min_renter_age: Option<i32>,
    pub capacity: Option<i32>,
}

/// Typed patch for asset updates. Unset fields keep their current
/// value; the update statement is fixed and fully parameterized.
#[derive(Debug, Clone, Default)]
pub struct UpdateAsset {
    pub name: Option<String>,
    pub daily_rate: Option<i64>,
    pub hourly_rate: Option<i64>,
    pub deposit_amount: Option<i64>,
    pub min_renter_age: Option<i32>,
    pub capacity: Option<i32>,
    pub is_active: Option<bool>,
}
