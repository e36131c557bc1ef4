//! Manual unavailability blocks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Who placed the block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockSource {
    Vendor,
    ExternalSync,
}

impl BlockSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockSource::Vendor => "vendor",
            BlockSource::ExternalSync => "external_sync",
        }
    }
}

/// A vendor- or system-imposed unavailability window on an asset.
/// Participates in the same overlap invariant as bookings.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Block {
    pub block_id: Uuid,
    pub asset_id: Uuid,
    pub start_utc: DateTime<Utc>,
    pub end_utc: DateTime<Utc>,
    pub reason: Option<String>,
    pub source: String,
    pub is_active: bool,
    pub created_utc: DateTime<Utc>,
}

/// Input for creating a block.
#[derive(Debug, Clone)]
pub struct CreateBlock {
    pub asset_id: Uuid,
    pub start_utc: DateTime<Utc>,
    pub end_utc: DateTime<Utc>,
    pub reason: Option<String>,
    pub source: BlockSource,
}
