//! Settlement math: commission split, deposit disposition, late-return
//! and cancellation fees.
//!
//! Everything here is integer minor-unit arithmetic. The split must
//! reconcile exactly: `platform_fee + vendor_amount == total`, always.

use crate::models::DepositStatus;
use chrono::{DateTime, Utc};

const SECONDS_PER_HOUR: i64 = 3_600;

/// Cancellation fee schedule: first tier whose hours-before-start
/// threshold the booking satisfies wins. Fee is a percentage of the
/// quoted total; the remainder is refunded.
const CANCELLATION_TIERS: &[(i64, i64)] = &[(24, 100), (72, 50), (168, 30)];
const CANCELLATION_BASE_PERCENT: i64 = 10;

/// Result of splitting a settled amount between platform and vendor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommissionSplit {
    pub platform_fee: i64,
    pub vendor_amount: i64,
}

/// Split `total` at `percent` (0..=100). The platform share floors, so
/// the vendor share absorbs the remainder and the two always sum back
/// to `total`.
pub fn commission_split(total: i64, percent: i32) -> CommissionSplit {
    let platform_fee = total * i64::from(percent) / 100;
    CommissionSplit {
        platform_fee,
        vendor_amount: total - platform_fee,
    }
}

/// Late-return fee: every started hour past the grace period bills at
/// the hourly rate.
pub fn late_return_fee(
    scheduled_end: DateTime<Utc>,
    actual_return: DateTime<Utc>,
    grace_minutes: i64,
    hourly_rate: i64,
) -> i64 {
    let late_seconds =
        (actual_return - scheduled_end).num_seconds() - grace_minutes * 60;
    if late_seconds <= 0 {
        return 0;
    }
    let late_hours = (late_seconds + SECONDS_PER_HOUR - 1) / SECONDS_PER_HOUR;
    late_hours * hourly_rate
}

/// Outcome of a cancellation: fee kept by the platform/vendor and the
/// amount refunded to the customer. The refund is never negative and a
/// zero refund is never issued to the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancellationOutcome {
    pub fee: i64,
    pub refund: i64,
}

/// Compute the cancellation fee from the tiered schedule.
pub fn cancellation_outcome(
    total: i64,
    scheduled_start: DateTime<Utc>,
    cancelled_at: DateTime<Utc>,
) -> CancellationOutcome {
    let hours_before = (scheduled_start - cancelled_at).num_seconds() / SECONDS_PER_HOUR;

    let percent = CANCELLATION_TIERS
        .iter()
        .find(|(threshold, _)| hours_before < *threshold)
        .map(|(_, percent)| *percent)
        .unwrap_or(CANCELLATION_BASE_PERCENT);

    let fee = total * percent / 100;
    CancellationOutcome {
        fee,
        refund: (total - fee).max(0),
    }
}

/// Disposition of a held deposit once all charges are known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepositDisposition {
    /// Amount kept to cover charges.
    pub deducted: i64,
    /// Amount returned to the customer.
    pub returned: i64,
    pub status: DepositStatus,
}

/// Deduct accumulated charges (late fee, fuel deficit, mileage overage,
/// damage) from a held deposit and return the remainder.
pub fn deposit_disposition(deposit: i64, charges: i64) -> DepositDisposition {
    if deposit == 0 {
        return DepositDisposition {
            deducted: 0,
            returned: 0,
            status: DepositStatus::None,
        };
    }
    if charges <= 0 {
        return DepositDisposition {
            deducted: 0,
            returned: deposit,
            status: DepositStatus::Released,
        };
    }
    if charges >= deposit {
        return DepositDisposition {
            deducted: deposit,
            returned: 0,
            status: DepositStatus::Forfeited,
        };
    }
    DepositDisposition {
        deducted: charges,
        returned: deposit - charges,
        status: DepositStatus::PartiallyReleased,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn split_always_reconciles() {
        for percent in 0..=100 {
            for total in [0i64, 1, 99, 100, 101, 64_000, 100_000, 987_654_321] {
                let split = commission_split(total, percent);
                assert_eq!(
                    split.platform_fee + split.vendor_amount,
                    total,
                    "split of {} at {}% does not reconcile",
                    total,
                    percent
                );
                assert!(split.platform_fee >= 0);
                assert!(split.vendor_amount >= 0);
            }
        }
    }

    #[test]
    fn split_floors_the_platform_share() {
        let split = commission_split(999, 10);
        assert_eq!(split.platform_fee, 99);
        assert_eq!(split.vendor_amount, 900);
    }

    #[test]
    fn ninety_minutes_late_with_half_hour_grace_bills_one_hour() {
        let scheduled = base_time();
        let actual = scheduled + Duration::minutes(90);
        assert_eq!(late_return_fee(scheduled, actual, 30, 7_000), 7_000);
    }

    #[test]
    fn return_within_grace_is_free() {
        let scheduled = base_time();
        let actual = scheduled + Duration::minutes(30);
        assert_eq!(late_return_fee(scheduled, actual, 30, 7_000), 0);

        let early = scheduled - Duration::hours(2);
        assert_eq!(late_return_fee(scheduled, early, 30, 7_000), 0);
    }

    #[test]
    fn one_second_past_grace_bills_a_full_hour() {
        let scheduled = base_time();
        let actual = scheduled + Duration::minutes(30) + Duration::seconds(1);
        assert_eq!(late_return_fee(scheduled, actual, 30, 7_000), 7_000);
    }

    #[test]
    fn cancellation_two_hours_before_start_forfeits_everything() {
        let start = base_time();
        let outcome = cancellation_outcome(100_000, start, start - Duration::hours(2));
        assert_eq!(outcome.fee, 100_000);
        assert_eq!(outcome.refund, 0);
    }

    #[test]
    fn cancellation_tiers_are_contiguous() {
        let start = base_time();
        let total = 100_000;

        // hours-before-start → expected fee percent
        let cases = [
            (0, 100),
            (23, 100),
            (24, 50),
            (71, 50),
            (72, 30),
            (167, 30),
            (168, 10),
            (1_000, 10),
        ];
        for (hours, percent) in cases {
            let outcome =
                cancellation_outcome(total, start, start - Duration::hours(hours));
            assert_eq!(
                outcome.fee,
                total * percent / 100,
                "wrong fee at {} hours before start",
                hours
            );
            assert_eq!(outcome.fee + outcome.refund, total);
            assert!(outcome.refund >= 0);
        }
    }

    #[test]
    fn cancellation_after_scheduled_start_forfeits_everything() {
        let start = base_time();
        let outcome = cancellation_outcome(100_000, start, start + Duration::hours(5));
        assert_eq!(outcome.fee, 100_000);
        assert_eq!(outcome.refund, 0);
    }

    #[test]
    fn clean_return_releases_the_full_deposit() {
        let disposition = deposit_disposition(300_000, 0);
        assert_eq!(disposition.returned, 300_000);
        assert_eq!(disposition.status, DepositStatus::Released);
    }

    #[test]
    fn charges_below_the_deposit_partially_release() {
        let disposition = deposit_disposition(300_000, 7_000);
        assert_eq!(disposition.deducted, 7_000);
        assert_eq!(disposition.returned, 293_000);
        assert_eq!(disposition.status, DepositStatus::PartiallyReleased);
    }

    #[test]
    fn charges_at_or_above_the_deposit_forfeit_it() {
        for charges in [300_000, 450_000] {
            let disposition = deposit_disposition(300_000, charges);
            assert_eq!(disposition.deducted, 300_000);
            assert_eq!(disposition.returned, 0);
            assert_eq!(disposition.status, DepositStatus::Forfeited);
        }
    }

    #[test]
    fn no_deposit_means_nothing_to_dispose() {
        let disposition = deposit_disposition(0, 7_000);
        assert_eq!(disposition.status, DepositStatus::None);
        assert_eq!(disposition.deducted, 0);
        assert_eq!(disposition.returned, 0);
    }
}
