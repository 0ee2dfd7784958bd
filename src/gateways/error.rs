use thiserror::Error;

pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("Credential error: {message}")]
    CredentialError { message: String },

    #[error("Amount {amount} is below the processor minimum of {minimum}")]
    AmountBelowMinimum { amount: i64, minimum: i64 },

    #[error("Gateway {gateway} responded HTTP {status_code}: {body}")]
    CommunicationError {
        gateway: String,
        status_code: u16,
        body: String,
        retryable: bool,
    },

    #[error("Gateway response did not match the expected schema: {message}")]
    MalformedResponse { message: String },

    #[error("Webhook signature is missing or invalid")]
    InvalidWebhookSignature,

    #[error("Unsupported gateway type: {kind}")]
    UnsupportedGateway { kind: String },

    #[error("No active payment gateway configured for tenant {tenant_id}")]
    NoGatewayConfigured { tenant_id: String },

    #[error("Network error: {message}")]
    NetworkError { message: String },

    #[error("Rate limit exceeded: {message}")]
    RateLimited {
        message: String,
        retry_after_seconds: Option<u64>,
    },

    #[error("Credential vault error: {message}")]
    VaultError { message: String },
}

impl GatewayError {
    /// Whether the caller may retry with backoff. Only transient failures
    /// qualify; processor rejections of a well-formed request never do.
    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::CredentialError { .. } => false,
            GatewayError::AmountBelowMinimum { .. } => false,
            GatewayError::CommunicationError { retryable, .. } => *retryable,
            GatewayError::MalformedResponse { .. } => false,
            GatewayError::InvalidWebhookSignature => false,
            GatewayError::UnsupportedGateway { .. } => false,
            GatewayError::NoGatewayConfigured { .. } => false,
            GatewayError::NetworkError { .. } => true,
            GatewayError::RateLimited { .. } => true,
            GatewayError::VaultError { .. } => true,
        }
    }

    pub fn http_status_code(&self) -> u16 {
        match self {
            GatewayError::CredentialError { .. } => 401,
            GatewayError::AmountBelowMinimum { .. } => 422,
            GatewayError::CommunicationError { .. } => 502,
            GatewayError::MalformedResponse { .. } => 502,
            GatewayError::InvalidWebhookSignature => 401,
            GatewayError::UnsupportedGateway { .. } => 400,
            GatewayError::NoGatewayConfigured { .. } => 422,
            GatewayError::NetworkError { .. } => 503,
            GatewayError::RateLimited { .. } => 429,
            GatewayError::VaultError { .. } => 503,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            GatewayError::CredentialError { .. } => {
                "Payment gateway credentials were rejected".to_string()
            }
            GatewayError::AmountBelowMinimum { minimum, .. } => {
                format!("Amount is below the minimum of {} cents", minimum)
            }
            GatewayError::CommunicationError { .. } => {
                "Payment gateway returned an error".to_string()
            }
            GatewayError::MalformedResponse { .. } => {
                "Payment gateway returned an unexpected response".to_string()
            }
            GatewayError::InvalidWebhookSignature => "Invalid webhook signature".to_string(),
            GatewayError::UnsupportedGateway { kind } => {
                format!("Gateway type '{}' is not supported", kind)
            }
            GatewayError::NoGatewayConfigured { .. } => {
                "No active payment gateway is configured for this account".to_string()
            }
            GatewayError::NetworkError { .. } => {
                "Payment gateway is temporarily unavailable".to_string()
            }
            GatewayError::RateLimited { .. } => {
                "Too many requests to the payment gateway. Please retry shortly".to_string()
            }
            GatewayError::VaultError { .. } => {
                "Credential service is temporarily unavailable".to_string()
            }
        }
    }
}

impl From<GatewayError> for crate::error::AppError {
    fn from(err: GatewayError) -> Self {
        use crate::error::{AppError, AppErrorKind, DomainError, ExternalError, ValidationError};

        let kind = match &err {
            GatewayError::AmountBelowMinimum { amount, minimum } => {
                AppErrorKind::Validation(ValidationError::AmountBelowMinimum {
                    amount: *amount,
                    minimum: *minimum,
                })
            }
            GatewayError::NoGatewayConfigured { tenant_id } => {
                AppErrorKind::Domain(DomainError::NoGatewayConfigured {
                    tenant_id: tenant_id.clone(),
                })
            }
            GatewayError::InvalidWebhookSignature => {
                AppErrorKind::Validation(ValidationError::InvalidWebhookSignature)
            }
            GatewayError::UnsupportedGateway { kind } => {
                AppErrorKind::Validation(ValidationError::UnsupportedGateway { kind: kind.clone() })
            }
            GatewayError::VaultError { message } => {
                AppErrorKind::External(ExternalError::Vault {
                    message: message.clone(),
                })
            }
            other => AppErrorKind::External(ExternalError::Gateway {
                message: other.to_string(),
                is_retryable: other.is_retryable(),
            }),
        };

        AppError::new(kind)
    }
}
