//! Booking model: the central entity of the engine.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Booking lifecycle status. All writes to the status column go through
/// the transition validator in `services::state_machine`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Hold,
    Confirmed,
    PickedUp,
    Returned,
    Completed,
    Cancelled,
    Expired,
    NoShow,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Hold => "hold",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::PickedUp => "picked_up",
            BookingStatus::Returned => "returned",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Expired => "expired",
            BookingStatus::NoShow => "no_show",
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        match s {
            "hold" => Some(BookingStatus::Hold),
            "confirmed" => Some(BookingStatus::Confirmed),
            "picked_up" => Some(BookingStatus::PickedUp),
            "returned" => Some(BookingStatus::Returned),
            "completed" => Some(BookingStatus::Completed),
            "cancelled" => Some(BookingStatus::Cancelled),
            "expired" => Some(BookingStatus::Expired),
            "no_show" => Some(BookingStatus::NoShow),
            _ => None,
        }
    }
}

/// Payment sub-state, orthogonal to the lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    RequiresReview,
    Refunded,
    PartiallyRefunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::RequiresReview => "requires_review",
            PaymentStatus::Refunded => "refunded",
            PaymentStatus::PartiallyRefunded => "partially_refunded",
        }
    }
}

/// Deposit sub-state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepositStatus {
    None,
    Held,
    Released,
    PartiallyReleased,
    Forfeited,
}

impl DepositStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DepositStatus::None => "none",
            DepositStatus::Held => "held",
            DepositStatus::Released => "released",
            DepositStatus::PartiallyReleased => "partially_released",
            DepositStatus::Forfeited => "forfeited",
        }
    }
}

/// Itemized price for a rental window. Produced by the pricing
/// calculator, persisted verbatim on the booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceBreakdown {
    pub total_hours: i64,
    pub rental_days: i64,
    pub remainder_hours: i64,
    pub base_amount: i64,
}

/// Customer/driver identity captured at hold creation. Immutable for
/// the lifetime of the booking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerSnapshot {
    pub name: String,
    pub phone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver_license: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guest_count: Option<i32>,
}

/// Asset-condition snapshot recorded by vendor staff at pickup and
/// return. Persisted verbatim; consumed only as audit and fee input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub odometer: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fuel_level: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub damage_notes: Option<String>,
}

/// Booking row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Booking {
    pub booking_id: Uuid,
    pub order_ref: String,
    pub asset_id: Uuid,
    pub vendor_id: Uuid,
    pub start_utc: DateTime<Utc>,
    pub end_utc: DateTime<Utc>,
    pub status: String,
    pub payment_status: String,
    pub deposit_status: String,
    pub total_hours: i64,
    pub rental_days: i64,
    pub remainder_hours: i64,
    pub base_amount: i64,
    pub total_amount: i64,
    pub deposit_amount: i64,
    pub late_fee: i64,
    pub cancellation_fee: i64,
    pub additional_charges: i64,
    pub refund_amount: i64,
    pub platform_fee: Option<i64>,
    pub vendor_amount: Option<i64>,
    pub payment_key: Option<String>,
    pub customer: serde_json::Value,
    pub pickup_report: Option<serde_json::Value>,
    pub return_report: Option<serde_json::Value>,
    pub hold_expires_at: DateTime<Utc>,
    pub confirmed_utc: Option<DateTime<Utc>>,
    pub picked_up_utc: Option<DateTime<Utc>>,
    pub returned_utc: Option<DateTime<Utc>>,
    pub completed_utc: Option<DateTime<Utc>>,
    pub cancelled_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Booking {
    pub fn price_breakdown(&self) -> PriceBreakdown {
        PriceBreakdown {
            total_hours: self.total_hours,
            rental_days: self.rental_days,
            remainder_hours: self.remainder_hours,
            base_amount: self.base_amount,
        }
    }
}

/// Input for creating a hold.
#[derive(Debug, Clone)]
pub struct CreateHold {
    pub asset_id: Uuid,
    pub start_utc: DateTime<Utc>,
    pub end_utc: DateTime<Utc>,
    pub customer: CustomerSnapshot,
}

/// One row of the append-only transition log.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TransitionLogEntry {
    pub transition_id: Uuid,
    pub booking_id: Uuid,
    pub from_status: Option<String>,
    pub to_status: String,
    pub reason: String,
    pub actor: String,
    pub created_utc: DateTime<Utc>,
}
