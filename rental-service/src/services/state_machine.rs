//! Booking state machine.
//!
//! The single place that knows which lifecycle transitions are legal.
//! Every mutation path goes through [`validate_transition`]; no module
//! writes the status column directly.

use crate::models::BookingStatus;
use service_core::error::AppError;

/// Legal transition targets for each state.
pub fn allowed_targets(from: BookingStatus) -> &'static [BookingStatus] {
    match from {
        BookingStatus::Hold => &[
            BookingStatus::Confirmed,
            BookingStatus::Expired,
            BookingStatus::Cancelled,
        ],
        BookingStatus::Confirmed => &[
            BookingStatus::PickedUp,
            BookingStatus::Cancelled,
            BookingStatus::NoShow,
        ],
        BookingStatus::PickedUp => &[BookingStatus::Returned],
        BookingStatus::Returned => &[BookingStatus::Completed],
        BookingStatus::Completed
        | BookingStatus::Cancelled
        | BookingStatus::Expired
        | BookingStatus::NoShow => &[],
    }
}

/// Reject any transition not in the table. Callers treat rejection as a
/// signal to re-fetch current state, never as something to coerce.
pub fn validate_transition(from: BookingStatus, to: BookingStatus) -> Result<(), AppError> {
    if allowed_targets(from).contains(&to) {
        Ok(())
    } else {
        Err(AppError::InvalidTransition {
            from: from.as_str().to_string(),
            to: to.as_str().to_string(),
        })
    }
}

/// Whether a booking in this status is terminal.
pub fn is_terminal(status: BookingStatus) -> bool {
    allowed_targets(status).is_empty()
}

/// Whether a booking in this status claims its interval for the
/// overlap invariant.
pub fn blocks_availability(status: BookingStatus) -> bool {
    matches!(
        status,
        BookingStatus::Hold | BookingStatus::Confirmed | BookingStatus::PickedUp
    )
}

/// Parse a persisted status column. The column is only ever written
/// from [`BookingStatus::as_str`], so a failure here means the store
/// was mutated out of band.
pub fn parse_status(s: &str) -> Result<BookingStatus, AppError> {
    BookingStatus::from_string(s)
        .ok_or_else(|| AppError::DatabaseError(anyhow::anyhow!("Unknown booking status '{}'", s)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BookingStatus::*;

    #[test]
    fn happy_path_is_legal() {
        assert!(validate_transition(Hold, Confirmed).is_ok());
        assert!(validate_transition(Confirmed, PickedUp).is_ok());
        assert!(validate_transition(PickedUp, Returned).is_ok());
        assert!(validate_transition(Returned, Completed).is_ok());
    }

    #[test]
    fn off_ramps_are_legal() {
        assert!(validate_transition(Hold, Expired).is_ok());
        assert!(validate_transition(Hold, Cancelled).is_ok());
        assert!(validate_transition(Confirmed, Cancelled).is_ok());
        assert!(validate_transition(Confirmed, NoShow).is_ok());
    }

    #[test]
    fn cancellation_is_rejected_once_picked_up() {
        let err = validate_transition(PickedUp, Cancelled).unwrap_err();
        assert_eq!(err.reason_code(), "invalid_transition");
        assert!(validate_transition(Returned, Cancelled).is_err());
        assert!(validate_transition(Completed, Cancelled).is_err());
    }

    #[test]
    fn terminal_states_allow_nothing() {
        for terminal in [Completed, Cancelled, Expired, NoShow] {
            assert!(is_terminal(terminal));
            for target in [
                Hold, Confirmed, PickedUp, Returned, Completed, Cancelled, Expired, NoShow,
            ] {
                assert!(validate_transition(terminal, target).is_err());
            }
        }
    }

    #[test]
    fn skipping_states_is_rejected() {
        assert!(validate_transition(Hold, PickedUp).is_err());
        assert!(validate_transition(Hold, Returned).is_err());
        assert!(validate_transition(Confirmed, Returned).is_err());
        assert!(validate_transition(Confirmed, Completed).is_err());
        assert!(validate_transition(PickedUp, Completed).is_err());
    }

    #[test]
    fn only_in_custody_statuses_block_availability() {
        assert!(blocks_availability(Hold));
        assert!(blocks_availability(Confirmed));
        assert!(blocks_availability(PickedUp));
        assert!(!blocks_availability(Returned));
        assert!(!blocks_availability(Completed));
        assert!(!blocks_availability(Cancelled));
        assert!(!blocks_availability(Expired));
        assert!(!blocks_availability(NoShow));
    }
}
