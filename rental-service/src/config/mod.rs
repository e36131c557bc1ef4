use anyhow::Result;
use dotenvy::dotenv;
use secrecy::Secret;
use serde::Deserialize;
use service_core::config::Config as CoreConfig;
use std::env;

#[derive(Deserialize, Clone, Debug)]
pub struct RentalConfig {
    pub common: CoreConfig,
    pub database: DatabaseConfig,
    pub gateway: GatewayConfig,
    pub booking: BookingPolicyConfig,
    pub service_name: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
}

#[derive(Deserialize, Clone, Debug)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Deserialize, Clone, Debug)]
pub struct GatewayConfig {
    pub api_base_url: String,
    /// Server-side API key; empty means the gateway is not configured
    /// and refund calls are skipped with a warning.
    pub secret_key: Secret<String>,
    /// Shared secret the gateway signs callback bodies with.
    pub webhook_secret: Secret<String>,
}

#[derive(Deserialize, Clone, Debug)]
pub struct BookingPolicyConfig {
    /// Minutes an unpaid hold keeps its interval claimed.
    pub hold_ttl_minutes: i64,
    /// Tolerance after scheduled return before late fees accrue.
    pub return_grace_minutes: i64,
    /// Commission percent applied when no commission_rates row matches.
    pub default_commission_percent: i32,
}

impl RentalConfig {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let common = CoreConfig::load()?;

        let db_url = env::var("RENTAL_DATABASE_URL").expect("RENTAL_DATABASE_URL must be set");
        let max_connections = env::var("RENTAL_DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()?;
        let min_connections = env::var("RENTAL_DATABASE_MIN_CONNECTIONS")
            .unwrap_or_else(|_| "1".to_string())
            .parse()?;

        let api_base_url = env::var("GATEWAY_API_BASE_URL")
            .unwrap_or_else(|_| "https://api.payments.example.com/v1".to_string());
        let secret_key = env::var("GATEWAY_SECRET_KEY").unwrap_or_default();
        let webhook_secret =
            env::var("GATEWAY_WEBHOOK_SECRET").unwrap_or_else(|_| "dev-webhook-secret".to_string());

        let hold_ttl_minutes = env::var("RENTAL_HOLD_TTL_MINUTES")
            .unwrap_or_else(|_| "10".to_string())
            .parse()?;
        let return_grace_minutes = env::var("RENTAL_RETURN_GRACE_MINUTES")
            .unwrap_or_else(|_| "30".to_string())
            .parse()?;
        let default_commission_percent = env::var("RENTAL_DEFAULT_COMMISSION_PERCENT")
            .unwrap_or_else(|_| "10".to_string())
            .parse()?;

        Ok(Self {
            common,
            database: DatabaseConfig {
                url: Secret::new(db_url),
                max_connections,
                min_connections,
            },
            gateway: GatewayConfig {
                api_base_url,
                secret_key: Secret::new(secret_key),
                webhook_secret: Secret::new(webhook_secret),
            },
            booking: BookingPolicyConfig {
                hold_ttl_minutes,
                return_grace_minutes,
                default_commission_percent,
            },
            service_name: "rental-service".to_string(),
            log_level: env::var("RENTAL_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            otlp_endpoint: env::var("RENTAL_OTLP_ENDPOINT").ok(),
        })
    }
}
