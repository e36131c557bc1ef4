use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("Bad request: {0}")]
    BadRequest(anyhow::Error),

    #[error("Invalid rental window: {0}")]
    InvalidWindow(String),

    #[error("Eligibility check failed: {0}")]
    EligibilityFailed(String),

    #[error("Not found: {0}")]
    NotFound(anyhow::Error),

    #[error("Unauthorized: {0}")]
    Unauthorized(anyhow::Error),

    #[error("Forbidden: {0}")]
    Forbidden(anyhow::Error),

    #[error("Callback signature verification failed")]
    SignatureInvalid,

    #[error("Conflict: {0}")]
    Conflict(anyhow::Error),

    #[error("Asset is not available for the requested window")]
    Unavailable,

    #[error("Illegal transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Paid amount {received} does not match quoted total {expected}")]
    AmountMismatch { expected: i64, received: i64 },

    #[error("Internal server error: {0}")]
    InternalError(#[from] anyhow::Error),

    #[error("Database error: {0}")]
    DatabaseError(anyhow::Error),

    #[error("Configuration error: {0}")]
    ConfigError(anyhow::Error),

    #[error("Service Unavailable")]
    ServiceUnavailable,
}

impl AppError {
    /// Stable machine-readable reason code, distinct from the display
    /// message. Clients branch on this to decide whether to retry,
    /// re-quote, or abandon.
    pub fn reason_code(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) => "validation_failed",
            AppError::BadRequest(_) => "bad_request",
            AppError::InvalidWindow(_) => "invalid_window",
            AppError::EligibilityFailed(_) => "eligibility_failed",
            AppError::NotFound(_) => "not_found",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Forbidden(_) => "forbidden",
            AppError::SignatureInvalid => "signature_invalid",
            AppError::Conflict(_) => "conflict",
            AppError::Unavailable => "unavailable",
            AppError::InvalidTransition { .. } => "invalid_transition",
            AppError::AmountMismatch { .. } => "amount_mismatch",
            AppError::InternalError(_) => "internal_error",
            // Store failures are safe to retry end-to-end; callers see a
            // retryable status.
            AppError::DatabaseError(_) => "store_error",
            AppError::ConfigError(_) => "config_error",
            AppError::ServiceUnavailable => "service_unavailable",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) | AppError::EligibilityFailed(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::BadRequest(_) | AppError::InvalidWindow(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) | AppError::SignatureInvalid => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Conflict(_)
            | AppError::Unavailable
            | AppError::InvalidTransition { .. }
            | AppError::AmountMismatch { .. } => StatusCode::CONFLICT,
            AppError::InternalError(_) | AppError::ConfigError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::DatabaseError(_) | AppError::ServiceUnavailable => {
                StatusCode::SERVICE_UNAVAILABLE
            }
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(anyhow::Error::new(err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(anyhow::Error::new(err))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            code: &'static str,
            error: String,
            #[serde(skip_serializing_if = "Option::is_none")]
            details: Option<String>,
        }

        let status = self.status();
        let code = self.reason_code();

        let (error_message, details) = match self {
            AppError::ValidationError(err) => {
                ("Validation error".to_string(), Some(err.to_string()))
            }
            AppError::InternalError(err) => (
                "Internal server error".to_string(),
                Some(format!("{:#}", err)),
            ),
            AppError::DatabaseError(err) => ("Store error".to_string(), Some(err.to_string())),
            AppError::ConfigError(err) => {
                ("Configuration error".to_string(), Some(err.to_string()))
            }
            other => (other.to_string(), None),
        };

        (
            status,
            Json(ErrorResponse {
                code,
                error: error_message,
                details,
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_codes_are_stable() {
        assert_eq!(AppError::Unavailable.reason_code(), "unavailable");
        assert_eq!(AppError::SignatureInvalid.reason_code(), "signature_invalid");
        assert_eq!(
            AppError::InvalidTransition {
                from: "completed".into(),
                to: "hold".into()
            }
            .reason_code(),
            "invalid_transition"
        );
        assert_eq!(
            AppError::AmountMismatch {
                expected: 64000,
                received: 63000
            }
            .reason_code(),
            "amount_mismatch"
        );
    }

    #[test]
    fn store_errors_map_to_retryable_status() {
        let err = AppError::DatabaseError(anyhow::anyhow!("connection reset"));
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn conflicts_map_to_409() {
        assert_eq!(AppError::Unavailable.status(), StatusCode::CONFLICT);
        let err = AppError::InvalidTransition {
            from: "hold".into(),
            to: "returned".into(),
        };
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }
}
