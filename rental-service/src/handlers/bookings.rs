//! Booking lifecycle handlers.
//!
//! Thin HTTP layer over the engine: quoting, hold creation, vendor
//! staff actions (pickup, return, charges), cancellation, no-show,
//! settlement, and the audit-trail read.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::models::{
    Asset, AssetCategory, Booking, ConditionReport, CreateHold, CustomerSnapshot, PriceBreakdown,
    TransitionLogEntry,
};
use crate::services::metrics::BOOKING_OPERATIONS_TOTAL;
use crate::services::pricing;
use crate::startup::AppState;

/// Request for a price quote. No side effects.
#[derive(Debug, Deserialize)]
pub struct QuoteRequest {
    pub asset_id: Uuid,
    pub start_utc: DateTime<Utc>,
    pub end_utc: DateTime<Utc>,
}

/// Itemized quote for a rental window.
#[derive(Debug, Serialize)]
pub struct QuoteResponse {
    pub asset_id: Uuid,
    pub total_hours: i64,
    pub rental_days: i64,
    pub remainder_hours: i64,
    pub base_amount: i64,
    pub deposit_amount: i64,
    pub available: bool,
}

/// Customer/driver details captured with the hold request.
#[derive(Debug, Deserialize, Validate)]
pub struct CustomerPayload {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(min = 1, max = 40))]
    pub phone: String,
    #[validate(email)]
    pub email: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub driver_license: Option<String>,
    #[validate(range(min = 1))]
    pub guest_count: Option<i32>,
}

impl From<CustomerPayload> for CustomerSnapshot {
    fn from(p: CustomerPayload) -> Self {
        Self {
            name: p.name,
            phone: p.phone,
            email: p.email,
            birth_date: p.birth_date,
            driver_license: p.driver_license,
            guest_count: p.guest_count,
        }
    }
}

/// Request to place a hold.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateBookingRequest {
    pub asset_id: Uuid,
    pub start_utc: DateTime<Utc>,
    pub end_utc: DateTime<Utc>,
    #[validate(nested)]
    pub customer: CustomerPayload,
}

/// Booking representation returned by every lifecycle endpoint.
#[derive(Debug, Serialize)]
pub struct BookingResponse {
    pub booking_id: Uuid,
    pub order_ref: String,
    pub asset_id: Uuid,
    pub status: String,
    pub payment_status: String,
    pub deposit_status: String,
    pub start_utc: DateTime<Utc>,
    pub end_utc: DateTime<Utc>,
    pub price_breakdown: PriceBreakdown,
    pub total_amount: i64,
    pub deposit_amount: i64,
    pub late_fee: i64,
    pub cancellation_fee: i64,
    pub additional_charges: i64,
    pub refund_amount: i64,
    pub platform_fee: Option<i64>,
    pub vendor_amount: Option<i64>,
    pub expires_at: DateTime<Utc>,
    pub created_utc: DateTime<Utc>,
}

impl From<Booking> for BookingResponse {
    fn from(b: Booking) -> Self {
        let price_breakdown = b.price_breakdown();
        Self {
            booking_id: b.booking_id,
            order_ref: b.order_ref,
            asset_id: b.asset_id,
            status: b.status,
            payment_status: b.payment_status,
            deposit_status: b.deposit_status,
            start_utc: b.start_utc,
            end_utc: b.end_utc,
            price_breakdown,
            total_amount: b.total_amount,
            deposit_amount: b.deposit_amount,
            late_fee: b.late_fee,
            cancellation_fee: b.cancellation_fee,
            additional_charges: b.additional_charges,
            refund_amount: b.refund_amount,
            platform_fee: b.platform_fee,
            vendor_amount: b.vendor_amount,
            expires_at: b.hold_expires_at,
            created_utc: b.created_utc,
        }
    }
}

/// Vendor staff action carrying an asset-condition snapshot.
#[derive(Debug, Deserialize, Validate)]
pub struct StaffActionRequest {
    #[validate(length(min = 1, max = 200))]
    pub actor: String,
    pub odometer: Option<i64>,
    pub fuel_level: Option<i32>,
    pub damage_notes: Option<String>,
}

impl StaffActionRequest {
    fn condition_report(&self) -> ConditionReport {
        ConditionReport {
            odometer: self.odometer,
            fuel_level: self.fuel_level,
            damage_notes: self.damage_notes.clone(),
        }
    }
}

/// Cancellation request.
#[derive(Debug, Deserialize)]
pub struct CancelBookingRequest {
    pub actor: Option<String>,
    pub reason: Option<String>,
}

/// Response to a cancellation, including whether a refund was
/// submitted to the gateway.
#[derive(Debug, Serialize)]
pub struct CancelBookingResponse {
    #[serde(flatten)]
    pub booking: BookingResponse,
    pub refund_submitted: bool,
}

/// Damage/fuel/mileage charge added by vendor staff.
#[derive(Debug, Deserialize, Validate)]
pub struct AddChargeRequest {
    #[validate(range(min = 1))]
    pub amount: i64,
    #[validate(length(min = 1, max = 500))]
    pub note: String,
}

/// Generic actor-only action body.
#[derive(Debug, Deserialize)]
pub struct ActorRequest {
    pub actor: Option<String>,
}

/// Compute a quote for an asset and window.
pub async fn quote(
    State(state): State<AppState>,
    Json(payload): Json<QuoteRequest>,
) -> Result<Json<QuoteResponse>, AppError> {
    let asset = fetch_rentable_asset(&state, payload.asset_id).await?;
    let breakdown = pricing::compute_breakdown(
        asset.daily_rate,
        asset.hourly_rate,
        payload.start_utc,
        payload.end_utc,
    )?;
    let available = state
        .db
        .is_available(asset.asset_id, payload.start_utc, payload.end_utc)
        .await?;

    Ok(Json(QuoteResponse {
        asset_id: asset.asset_id,
        total_hours: breakdown.total_hours,
        rental_days: breakdown.rental_days,
        remainder_hours: breakdown.remainder_hours,
        base_amount: breakdown.base_amount,
        deposit_amount: asset.deposit_amount,
        available,
    }))
}

/// Place a hold on an asset's interval.
pub async fn create_booking(
    State(state): State<AppState>,
    Json(payload): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<BookingResponse>), AppError> {
    payload.validate()?;

    tracing::info!(
        asset_id = %payload.asset_id,
        start_utc = %payload.start_utc,
        end_utc = %payload.end_utc,
        "Hold requested"
    );

    let asset = fetch_rentable_asset(&state, payload.asset_id).await?;
    let customer: CustomerSnapshot = payload.customer.into();

    check_eligibility(&asset, &customer, payload.start_utc)?;

    let breakdown = pricing::compute_breakdown(
        asset.daily_rate,
        asset.hourly_rate,
        payload.start_utc,
        payload.end_utc,
    )?;

    let input = CreateHold {
        asset_id: asset.asset_id,
        start_utc: payload.start_utc,
        end_utc: payload.end_utc,
        customer,
    };

    let result = state
        .db
        .create_hold(&asset, &input, &breakdown, state.config.booking.hold_ttl_minutes)
        .await;

    let outcome = if result.is_ok() { "ok" } else { "rejected" };
    BOOKING_OPERATIONS_TOTAL
        .with_label_values(&["create_hold", outcome])
        .inc();

    let booking = result?;
    Ok((StatusCode::CREATED, Json(booking.into())))
}

/// Fetch a booking.
pub async fn get_booking(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<BookingResponse>, AppError> {
    let booking = state
        .db
        .get_booking(booking_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Booking not found")))?;

    Ok(Json(booking.into()))
}

/// Read the append-only transition log for a booking.
pub async fn list_transitions(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<Vec<TransitionLogEntry>>, AppError> {
    state
        .db
        .get_booking(booking_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Booking not found")))?;

    Ok(Json(state.db.list_transitions(booking_id).await?))
}

/// Record asset handover at pickup.
pub async fn record_pickup(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
    Json(payload): Json<StaffActionRequest>,
) -> Result<Json<BookingResponse>, AppError> {
    payload.validate()?;

    let booking = state
        .db
        .record_pickup(booking_id, &payload.condition_report(), &payload.actor)
        .await?;

    BOOKING_OPERATIONS_TOTAL
        .with_label_values(&["pickup", "ok"])
        .inc();

    Ok(Json(booking.into()))
}

/// Record asset return; late fees accrue past the grace period.
pub async fn record_return(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
    Json(payload): Json<StaffActionRequest>,
) -> Result<Json<BookingResponse>, AppError> {
    payload.validate()?;

    let booking = state
        .db
        .record_return(
            booking_id,
            &payload.condition_report(),
            &payload.actor,
            state.config.booking.return_grace_minutes,
        )
        .await?;

    BOOKING_OPERATIONS_TOTAL
        .with_label_values(&["return", "ok"])
        .inc();

    Ok(Json(booking.into()))
}

/// Add a damage/fuel/mileage charge before settlement.
pub async fn add_charge(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
    Json(payload): Json<AddChargeRequest>,
) -> Result<Json<BookingResponse>, AppError> {
    payload.validate()?;

    let booking = state
        .db
        .add_additional_charge(booking_id, payload.amount, &payload.note)
        .await?;

    Ok(Json(booking.into()))
}

/// Cancel a hold or confirmed booking.
///
/// The state change and fee computation commit first; a refund, when
/// one is due, is then submitted to the gateway and the final payment
/// status lands via the gateway's cancellation callback.
pub async fn cancel_booking(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
    Json(payload): Json<CancelBookingRequest>,
) -> Result<Json<CancelBookingResponse>, AppError> {
    let actor = payload.actor.as_deref().unwrap_or("customer");
    let reason = payload.reason.as_deref().unwrap_or("customer_cancelled");

    let result = state.db.cancel_booking(booking_id, actor, reason).await;

    let outcome = if result.is_ok() { "ok" } else { "rejected" };
    BOOKING_OPERATIONS_TOTAL
        .with_label_values(&["cancel", outcome])
        .inc();

    let booking = result?;

    let mut refund_submitted = false;
    if booking.refund_amount > 0 {
        if let Some(payment_key) = booking.payment_key.as_deref() {
            if state.gateway.is_configured() {
                match state
                    .gateway
                    .cancel_payment(payment_key, booking.refund_amount, reason)
                    .await
                {
                    Ok(_) => refund_submitted = true,
                    Err(e) => {
                        // The cancellation itself is committed; the refund
                        // stays visible as unreturned until ops retry it.
                        tracing::error!(
                            booking_id = %booking_id,
                            refund_amount = booking.refund_amount,
                            error = %e,
                            "Refund submission to gateway failed"
                        );
                    }
                }
            } else {
                tracing::warn!(
                    booking_id = %booking_id,
                    refund_amount = booking.refund_amount,
                    "Gateway not configured - refund must be issued manually"
                );
            }
        }
    }

    Ok(Json(CancelBookingResponse {
        booking: booking.into(),
        refund_submitted,
    }))
}

/// Mark a confirmed booking as a no-show.
pub async fn mark_no_show(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
    Json(payload): Json<ActorRequest>,
) -> Result<Json<BookingResponse>, AppError> {
    let actor = payload.actor.as_deref().unwrap_or("vendor");
    let booking = state.db.mark_no_show(booking_id, actor).await?;

    Ok(Json(booking.into()))
}

/// Finalize settlement: deposit disposition and commission split.
pub async fn settle_booking(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
    Json(payload): Json<ActorRequest>,
) -> Result<Json<BookingResponse>, AppError> {
    let actor = payload.actor.as_deref().unwrap_or("system");
    let booking = state
        .db
        .settle_booking(
            booking_id,
            actor,
            state.config.booking.default_commission_percent,
        )
        .await?;

    BOOKING_OPERATIONS_TOTAL
        .with_label_values(&["settle", "ok"])
        .inc();

    Ok(Json(booking.into()))
}

/// Expiry sweep for external cron: release every past-due hold.
pub async fn expire_holds(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let expired = state.db.expire_stale_holds().await?;
    Ok(Json(serde_json::json!({ "expired": expired })))
}

async fn fetch_rentable_asset(state: &AppState, asset_id: Uuid) -> Result<Asset, AppError> {
    let asset = state
        .db
        .get_asset(asset_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Asset not found")))?;

    if !asset.is_active {
        return Err(AppError::NotFound(anyhow::anyhow!("Asset is not active")));
    }

    Ok(asset)
}

/// Category-specific eligibility: minimum driver age for vehicles,
/// capacity for rooms.
fn check_eligibility(
    asset: &Asset,
    customer: &CustomerSnapshot,
    start_utc: DateTime<Utc>,
) -> Result<(), AppError> {
    match AssetCategory::from_string(&asset.category) {
        Some(AssetCategory::Vehicle) => {
            if let Some(min_age) = asset.min_renter_age {
                let birth_date = customer.birth_date.ok_or_else(|| {
                    AppError::EligibilityFailed(
                        "Driver birth date is required for this vehicle".to_string(),
                    )
                })?;
                if age_at(birth_date, start_utc.date_naive()) < min_age {
                    return Err(AppError::EligibilityFailed(format!(
                        "Driver must be at least {} years old",
                        min_age
                    )));
                }
            }
        }
        Some(AssetCategory::Room) => {
            if let Some(capacity) = asset.capacity {
                let guests = customer.guest_count.unwrap_or(1);
                if guests > capacity {
                    return Err(AppError::EligibilityFailed(format!(
                        "Room sleeps at most {} guests",
                        capacity
                    )));
                }
            }
        }
        None => {
            return Err(AppError::InternalError(anyhow::anyhow!(
                "Asset has unknown category '{}'",
                asset.category
            )));
        }
    }

    Ok(())
}

fn age_at(birth_date: NaiveDate, on: NaiveDate) -> i32 {
    let mut age = on.year() - birth_date.year();
    if (on.month(), on.day()) < (birth_date.month(), birth_date.day()) {
        age -= 1;
    }
    age
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn age_counts_completed_years_only() {
        let birth = NaiveDate::from_ymd_opt(2000, 6, 15).unwrap();
        assert_eq!(age_at(birth, NaiveDate::from_ymd_opt(2025, 6, 14).unwrap()), 24);
        assert_eq!(age_at(birth, NaiveDate::from_ymd_opt(2025, 6, 15).unwrap()), 25);
        assert_eq!(age_at(birth, NaiveDate::from_ymd_opt(2025, 6, 16).unwrap()), 25);
    }
}
