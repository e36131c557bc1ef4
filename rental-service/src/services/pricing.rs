//! Pricing calculator.
//!
//! Pure day/hour pricing over a rental window. Partial hours always
//! round up to a full hour; this must match the billing side exactly.

use crate::models::PriceBreakdown;
use chrono::{DateTime, Utc};
use service_core::error::AppError;

const SECONDS_PER_HOUR: i64 = 3_600;
const HOURS_PER_DAY: i64 = 24;

/// Compute the itemized price for a rental window.
///
/// `total_hours` is the window length rounded up at the hour boundary,
/// split into whole days billed at `daily_rate` and remainder hours
/// billed at `hourly_rate`.
pub fn compute_breakdown(
    daily_rate: i64,
    hourly_rate: i64,
    start_utc: DateTime<Utc>,
    end_utc: DateTime<Utc>,
) -> Result<PriceBreakdown, AppError> {
    if end_utc <= start_utc {
        return Err(AppError::InvalidWindow(format!(
            "end {} must be after start {}",
            end_utc, start_utc
        )));
    }

    let seconds = (end_utc - start_utc).num_seconds();
    let total_hours = (seconds + SECONDS_PER_HOUR - 1) / SECONDS_PER_HOUR;
    let rental_days = total_hours / HOURS_PER_DAY;
    let remainder_hours = total_hours % HOURS_PER_DAY;
    let base_amount = rental_days * daily_rate + remainder_hours * hourly_rate;

    Ok(PriceBreakdown {
        total_hours,
        rental_days,
        remainder_hours,
        base_amount,
    })
}
