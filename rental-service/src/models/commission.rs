//! Commission rate configuration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A commission resolution record. Scope narrows by precedence:
/// vendor-specific beats category-specific beats the global default
/// (both scopes null). Administrator-managed; the booking flow only
/// reads these.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CommissionRate {
    pub rate_id: Uuid,
    pub vendor_id: Option<Uuid>,
    pub category: Option<String>,
    pub percent: i32,
    pub is_active: bool,
    pub effective_from: Option<DateTime<Utc>>,
    pub effective_until: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
}

/// Input for creating a commission rate.
#[derive(Debug, Clone)]
pub struct CreateCommissionRate {
    pub vendor_id: Option<Uuid>,
    pub category: Option<String>,
    pub percent: i32,
    pub effective_from: Option<DateTime<Utc>>,
    pub effective_until: Option<DateTime<Utc>>,
}

/// Typed patch for commission rate updates.
#[derive(Debug, Clone, Default)]
pub struct UpdateCommissionRate {
    pub percent: Option<i32>,
    pub is_active: Option<bool>,
    pub effective_from: Option<DateTime<Utc>>,
    pub effective_until: Option<DateTime<Utc>>,
}
