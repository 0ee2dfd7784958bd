//! Unified error handling for the Rifaflow backend.
//!
//! Every fallible subsystem converts into [`AppError`], which carries the
//! HTTP status mapping, a stable machine-readable code, and a message safe
//! to show to end users.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable error codes for programmatic client handling
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCode {
    // Domain errors (4xx)
    #[serde(rename = "NO_GATEWAY_CONFIGURED")]
    NoGatewayConfigured,
    #[serde(rename = "INVALID_STATE_TRANSITION")]
    InvalidStateTransition,
    #[serde(rename = "PAYMENT_NOT_FOUND")]
    PaymentNotFound,

    // Validation errors (4xx)
    #[serde(rename = "AMOUNT_BELOW_MINIMUM")]
    AmountBelowMinimum,
    #[serde(rename = "INVALID_WEBHOOK_SIGNATURE")]
    InvalidWebhookSignature,
    #[serde(rename = "UNSUPPORTED_GATEWAY")]
    UnsupportedGateway,
    #[serde(rename = "CODE_VALIDATION_FAILED")]
    CodeValidationFailed,
    #[serde(rename = "VALIDATION_ERROR")]
    ValidationError,

    // Infrastructure errors (5xx)
    #[serde(rename = "DATABASE_ERROR")]
    DatabaseError,
    #[serde(rename = "CONFIGURATION_ERROR")]
    ConfigurationError,

    // External errors (502, 503, 429)
    #[serde(rename = "GATEWAY_ERROR")]
    GatewayError,
    #[serde(rename = "VAULT_ERROR")]
    VaultError,

    // Generic
    #[serde(rename = "INTERNAL_ERROR")]
    InternalError,
}

/// Business-rule violations
#[derive(Debug, Clone)]
pub enum DomainError {
    /// Tenant has no active gateway configuration to charge through
    NoGatewayConfigured { tenant_id: String },
    /// Requested lifecycle move is not allowed from the current state
    InvalidStateTransition { from: String, to: String },
    /// Payment with the given code or id doesn't exist
    PaymentNotFound { reference: String },
}

/// Infrastructure-level errors (database, configuration)
#[derive(Debug, Clone)]
pub enum InfrastructureError {
    /// Database connection or query failure
    Database { message: String, is_retryable: bool },
    /// Missing or invalid configuration
    Configuration { message: String },
}

/// External service errors (payment processors, credential vault)
#[derive(Debug, Clone)]
pub enum ExternalError {
    /// Payment processor (SuitPay, Paggue) error
    Gateway { message: String, is_retryable: bool },
    /// Credential vault unreachable or rejecting requests
    Vault { message: String },
}

/// Input validation errors
#[derive(Debug, Clone)]
pub enum ValidationError {
    /// Charge amount is under the processor minimum
    AmountBelowMinimum { amount: i64, minimum: i64 },
    /// Webhook signature missing or not matching the payload
    InvalidWebhookSignature,
    /// Gateway type name not in the supported set
    UnsupportedGateway { kind: String },
    /// Payment code failed structural or checksum validation
    MalformedPaymentCode { code: String },
    /// Invalid amount (format or value)
    InvalidAmount { amount: String, reason: String },
    /// Required field missing
    MissingField { field: String },
}

/// Unified application error type
#[derive(Debug, Clone)]
pub struct AppError {
    pub kind: AppErrorKind,
    pub request_id: Option<String>,
    pub context: Option<String>,
}

#[derive(Debug, Clone)]
pub enum AppErrorKind {
    Domain(DomainError),
    Infrastructure(InfrastructureError),
    External(ExternalError),
    Validation(ValidationError),
}

impl AppError {
    pub fn new(kind: AppErrorKind) -> Self {
        Self {
            kind,
            request_id: None,
            context: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Map error to HTTP status code
    pub fn status_code(&self) -> u16 {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::NoGatewayConfigured { .. } => 422,
                DomainError::InvalidStateTransition { .. } => 409, // Conflict
                DomainError::PaymentNotFound { .. } => 404,
            },
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { .. } => 500,
                InfrastructureError::Configuration { .. } => 500,
            },
            AppErrorKind::External(err) => match err {
                ExternalError::Gateway { .. } => 502, // Bad Gateway
                ExternalError::Vault { .. } => 503,
            },
            AppErrorKind::Validation(err) => match err {
                ValidationError::AmountBelowMinimum { .. } => 422,
                ValidationError::InvalidWebhookSignature => 401,
                ValidationError::UnsupportedGateway { .. } => 400,
                ValidationError::MalformedPaymentCode { .. } => 400,
                ValidationError::InvalidAmount { .. } => 400,
                ValidationError::MissingField { .. } => 400,
            },
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> ErrorCode {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::NoGatewayConfigured { .. } => ErrorCode::NoGatewayConfigured,
                DomainError::InvalidStateTransition { .. } => ErrorCode::InvalidStateTransition,
                DomainError::PaymentNotFound { .. } => ErrorCode::PaymentNotFound,
            },
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { .. } => ErrorCode::DatabaseError,
                InfrastructureError::Configuration { .. } => ErrorCode::ConfigurationError,
            },
            AppErrorKind::External(err) => match err {
                ExternalError::Gateway { .. } => ErrorCode::GatewayError,
                ExternalError::Vault { .. } => ErrorCode::VaultError,
            },
            AppErrorKind::Validation(err) => match err {
                ValidationError::AmountBelowMinimum { .. } => ErrorCode::AmountBelowMinimum,
                ValidationError::InvalidWebhookSignature => ErrorCode::InvalidWebhookSignature,
                ValidationError::UnsupportedGateway { .. } => ErrorCode::UnsupportedGateway,
                ValidationError::MalformedPaymentCode { .. } => ErrorCode::CodeValidationFailed,
                ValidationError::InvalidAmount { .. } => ErrorCode::ValidationError,
                ValidationError::MissingField { .. } => ErrorCode::ValidationError,
            },
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::NoGatewayConfigured { .. } => {
                    "No active payment gateway is configured for this account".to_string()
                }
                DomainError::InvalidStateTransition { from, to } => {
                    format!("Payment cannot move from '{}' to '{}'", from, to)
                }
                DomainError::PaymentNotFound { reference } => {
                    format!("Payment '{}' not found", reference)
                }
            },
            AppErrorKind::Infrastructure(_) => {
                "Service temporarily unavailable. Please try again later".to_string()
            }
            AppErrorKind::External(err) => match err {
                ExternalError::Gateway { is_retryable, .. } => {
                    if *is_retryable {
                        "Payment gateway is temporarily unavailable. Please try again".to_string()
                    } else {
                        "Payment processing failed. Please contact support".to_string()
                    }
                }
                ExternalError::Vault { .. } => {
                    "Payment service is temporarily unavailable. Please try again later"
                        .to_string()
                }
            },
            AppErrorKind::Validation(err) => match err {
                ValidationError::AmountBelowMinimum { minimum, .. } => {
                    format!(
                        "Minimum payment amount is R$ {},{:02}",
                        minimum / 100,
                        minimum % 100
                    )
                }
                ValidationError::InvalidWebhookSignature => {
                    "Webhook signature is invalid".to_string()
                }
                ValidationError::UnsupportedGateway { kind } => {
                    format!("Payment gateway '{}' is not supported", kind)
                }
                ValidationError::MalformedPaymentCode { code } => {
                    format!("Payment code '{}' is not valid", code)
                }
                ValidationError::InvalidAmount { amount, reason } => {
                    format!("Invalid amount '{}': {}", amount, reason)
                }
                ValidationError::MissingField { field } => {
                    format!("Required field '{}' is missing", field)
                }
            },
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match &self.kind {
            AppErrorKind::Domain(_) => false,
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { is_retryable, .. } => *is_retryable,
                InfrastructureError::Configuration { .. } => false,
            },
            AppErrorKind::External(err) => match err {
                ExternalError::Gateway { is_retryable, .. } => *is_retryable,
                ExternalError::Vault { .. } => true,
            },
            AppErrorKind::Validation(_) => false,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.user_message())
    }
}

impl std::error::Error for AppError {}

// Conversions from subsystem errors live next to the source type:
// From<GatewayError> in gateways/error.rs, From<DatabaseError> in
// database/error.rs.

/// Result type for operations that can fail with AppError
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_state_transition_error() {
        let error = AppError::new(AppErrorKind::Domain(DomainError::InvalidStateTransition {
            from: "approved".to_string(),
            to: "canceled".to_string(),
        }));

        assert_eq!(error.status_code(), 409);
        assert_eq!(error.error_code(), ErrorCode::InvalidStateTransition);
        assert!(error.user_message().contains("approved"));
        assert!(!error.is_retryable());
    }

    #[test]
    fn test_amount_below_minimum_error() {
        let error = AppError::new(AppErrorKind::Validation(
            ValidationError::AmountBelowMinimum {
                amount: 100,
                minimum: 500,
            },
        ));

        assert_eq!(error.status_code(), 422);
        assert_eq!(error.error_code(), ErrorCode::AmountBelowMinimum);
        assert_eq!(error.user_message(), "Minimum payment amount is R$ 5,00");
    }

    #[test]
    fn test_no_gateway_configured_error() {
        let error = AppError::new(AppErrorKind::Domain(DomainError::NoGatewayConfigured {
            tenant_id: "d9e5a1cc".to_string(),
        }));

        assert_eq!(error.status_code(), 422);
        assert_eq!(error.error_code(), ErrorCode::NoGatewayConfigured);
        assert!(!error.is_retryable());
    }

    #[test]
    fn test_malformed_payment_code_error() {
        let error = AppError::new(AppErrorKind::Validation(
            ValidationError::MalformedPaymentCode {
                code: "PAY-XXXX".to_string(),
            },
        ));

        assert_eq!(error.status_code(), 400);
        assert_eq!(error.error_code(), ErrorCode::CodeValidationFailed);
    }

    #[test]
    fn test_retryable_gateway_error() {
        let error = AppError::new(AppErrorKind::External(ExternalError::Gateway {
            message: "upstream 503".to_string(),
            is_retryable: true,
        }));

        assert_eq!(error.status_code(), 502);
        assert!(error.is_retryable());
    }

    #[test]
    fn test_error_code_serializes_screaming_snake() {
        let serialized = serde_json::to_string(&ErrorCode::CodeValidationFailed)
            .expect("error code should serialize");
        assert_eq!(serialized, r#""CODE_VALIDATION_FAILED""#);
    }
}
