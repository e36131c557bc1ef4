//! Payment event processor.
//!
//! Front door for gateway callbacks: verifies the signature over the
//! raw body, parses the payload, and routes known event types into the
//! transactional, idempotent apply in the database layer. Once an
//! event is durably recorded as handled the caller gets success — on
//! replays too — so the gateway's retry machinery stops. Only a bad
//! signature or a malformed payload is rejected.

use crate::models::CallbackEvent;
use crate::services::database::Database;
use crate::services::gateway::GatewayClient;
use crate::services::metrics::WEBHOOK_EVENTS_TOTAL;
use service_core::error::AppError;
use std::sync::Arc;

pub const EVENT_PAYMENT_APPROVED: &str = "PAYMENT_APPROVED";
pub const EVENT_PAYMENT_CANCELED: &str = "PAYMENT_CANCELED";

/// What happened to a callback after verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// The event drove a state change.
    Applied,
    /// Idempotent replay; recorded before, no effects this time.
    Replayed,
    /// Recorded as handled, but the booking was flagged for manual
    /// reconciliation instead of transitioning.
    FlaggedForReview,
    /// Unknown event type; acknowledged so the gateway stops retrying.
    Ignored,
}

impl CallbackOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallbackOutcome::Applied => "applied",
            CallbackOutcome::Replayed => "replayed",
            CallbackOutcome::FlaggedForReview => "flagged_for_review",
            CallbackOutcome::Ignored => "ignored",
        }
    }
}

/// Stateless processor over the shared database and gateway client.
#[derive(Clone)]
pub struct PaymentProcessor {
    db: Arc<Database>,
    gateway: GatewayClient,
}

impl PaymentProcessor {
    pub fn new(db: Arc<Database>, gateway: GatewayClient) -> Self {
        Self { db, gateway }
    }

    /// Process one signed callback delivery.
    #[tracing::instrument(skip(self, raw_body, signature))]
    pub async fn process(&self, raw_body: &str, signature: &str) -> Result<CallbackOutcome, AppError> {
        let valid = self
            .gateway
            .verify_callback_signature(raw_body, signature)
            .map_err(|e| {
                tracing::error!(error = %e, "Signature verification error");
                AppError::InternalError(anyhow::anyhow!("Signature verification failed"))
            })?;

        if !valid {
            // Potential forgery attempt; worth an operator's attention.
            tracing::warn!("Callback rejected: invalid signature");
            return Err(AppError::SignatureInvalid);
        }

        let event: CallbackEvent = serde_json::from_str(raw_body).map_err(|e| {
            tracing::warn!(error = %e, "Callback rejected: malformed payload");
            AppError::BadRequest(anyhow::anyhow!("Malformed callback payload: {}", e))
        })?;
        let raw_payload: serde_json::Value = serde_json::from_str(raw_body)
            .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Malformed callback payload: {}", e)))?;

        tracing::info!(
            event_type = %event.event_type,
            order_ref = %event.data.order_id,
            payment_key = %event.data.payment_key,
            "Processing payment callback"
        );

        let outcome = match event.event_type.as_str() {
            EVENT_PAYMENT_APPROVED => self.db.apply_payment_approved(&event, &raw_payload).await?,
            EVENT_PAYMENT_CANCELED => self.db.apply_payment_canceled(&event, &raw_payload).await?,
            other => {
                tracing::warn!(event_type = %other, "Unhandled callback event type, acknowledging");
                CallbackOutcome::Ignored
            }
        };

        WEBHOOK_EVENTS_TOTAL
            .with_label_values(&[event.event_type.as_str(), outcome.as_str()])
            .inc();

        Ok(outcome)
    }
}
