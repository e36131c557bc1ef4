//! Payment gateway client.
//!
//! Wraps the gateway's cancel/refund API and callback signature
//! verification. Once a payment is submitted to the gateway there is no
//! client-side abort; the cancel API here is the only recourse.

use crate::config::GatewayConfig;
use anyhow::{Result, anyhow};
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use service_core::utils::signature::verify_payload;

/// Client for the payment gateway's server-side API.
#[derive(Clone)]
pub struct GatewayClient {
    client: Client,
    config: GatewayConfig,
}

/// Request body for a cancel/refund call.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelPaymentRequest {
    pub cancel_reason: String,
    /// Minor units to refund. The gateway treats a missing amount as a
    /// full cancellation, so it is always set explicitly here.
    pub cancel_amount: i64,
}

/// Gateway response to a cancel/refund call.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelPaymentResponse {
    pub payment_key: String,
    pub order_id: String,
    pub status: String,
    #[serde(default)]
    pub canceled_at: Option<String>,
}

/// Gateway API error body.
#[derive(Debug, Deserialize)]
pub struct GatewayErrorBody {
    pub code: String,
    pub message: String,
}

impl GatewayClient {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    /// Check if the gateway is configured (API credentials are set).
    pub fn is_configured(&self) -> bool {
        !self.config.secret_key.expose_secret().is_empty()
    }

    /// Verify the HMAC-SHA256 hex signature the gateway attached to a
    /// callback body.
    pub fn verify_callback_signature(&self, raw_body: &str, signature: &str) -> Result<bool> {
        verify_payload(
            self.config.webhook_secret.expose_secret(),
            raw_body,
            signature,
        )
    }

    /// Cancel (refund) a payment through the gateway.
    ///
    /// # Arguments
    /// * `payment_key` - the gateway's transaction id for the payment
    /// * `cancel_amount` - minor units to refund
    /// * `reason` - human-readable reason recorded by the gateway
    pub async fn cancel_payment(
        &self,
        payment_key: &str,
        cancel_amount: i64,
        reason: &str,
    ) -> Result<CancelPaymentResponse> {
        if !self.is_configured() {
            return Err(anyhow!("Payment gateway credentials not configured"));
        }

        let url = format!("{}/payments/{}/cancel", self.config.api_base_url, payment_key);

        let response = self
            .client
            .post(&url)
            .basic_auth(self.config.secret_key.expose_secret(), None::<&str>)
            .json(&CancelPaymentRequest {
                cancel_reason: reason.to_string(),
                cancel_amount,
            })
            .send()
            .await?;

        if response.status().is_success() {
            Ok(response.json::<CancelPaymentResponse>().await?)
        } else {
            let status = response.status();
            let error = response
                .json::<GatewayErrorBody>()
                .await
                .unwrap_or_else(|_| GatewayErrorBody {
                    code: "UNKNOWN".to_string(),
                    message: "Unparseable gateway error".to_string(),
                });
            Err(anyhow!(
                "Gateway cancel failed ({}): {} - {}",
                status,
                error.code,
                error.message
            ))
        }
    }
}
