//! Processed gateway callback records and the inbound callback shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// An immutable record of one processed gateway callback. Append-only;
/// the unique idempotency key is the at-most-once guard.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PaymentEvent {
    pub event_id: Uuid,
    pub idempotency_key: String,
    pub booking_id: Uuid,
    pub event_type: String,
    pub payment_key: String,
    pub order_ref: String,
    pub amount: i64,
    pub occurred_at: DateTime<Utc>,
    pub payload: serde_json::Value,
    pub created_utc: DateTime<Utc>,
}

/// Inbound callback payload as the gateway sends it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackEvent {
    pub event_type: String,
    pub data: CallbackData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackData {
    pub payment_key: String,
    /// Must equal the booking's public `order_ref`.
    pub order_id: String,
    pub total_amount: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canceled_at: Option<DateTime<Utc>>,
}

impl CallbackEvent {
    /// The instant the gateway stamped on the event. Part of the event
    /// identity: a re-delivery carries the same timestamp, a genuinely
    /// new event of the same type carries a new one.
    pub fn occurred_at(&self) -> Option<DateTime<Utc>> {
        self.data.approved_at.or(self.data.canceled_at)
    }

    /// Idempotency key derived from the event identity.
    pub fn idempotency_key(&self) -> Option<String> {
        let occurred_at = self.occurred_at()?;
        Some(format!(
            "{}:{}:{}",
            self.event_type,
            self.data.payment_key,
            occurred_at.timestamp()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idempotency_key_is_stable_across_redeliveries() {
        let body = r#"{
            "eventType": "PAYMENT_APPROVED",
            "data": {
                "paymentKey": "pay_abc123",
                "orderId": "RNT-1",
                "totalAmount": 64000,
                "approvedAt": "2025-03-01T10:00:00Z"
            }
        }"#;

        let first: CallbackEvent = serde_json::from_str(body).unwrap();
        let second: CallbackEvent = serde_json::from_str(body).unwrap();
        assert_eq!(first.idempotency_key(), second.idempotency_key());
        assert_eq!(
            first.idempotency_key().unwrap(),
            "PAYMENT_APPROVED:pay_abc123:1740823200"
        );
    }

    #[test]
    fn event_without_timestamp_has_no_key() {
        let body = r#"{
            "eventType": "PAYMENT_APPROVED",
            "data": {
                "paymentKey": "pay_abc123",
                "orderId": "RNT-1",
                "totalAmount": 64000
            }
        }"#;

        let event: CallbackEvent = serde_json::from_str(body).unwrap();
        assert!(event.idempotency_key().is_none());
    }
}
