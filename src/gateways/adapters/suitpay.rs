use crate::gateways::error::{GatewayError, GatewayResult};
use crate::gateways::gateway::PaymentGateway;
use crate::gateways::http::{verify_hmac_sha512_hex, GatewayHttpClient};
use crate::gateways::types::{
    digits_only, CreateTransactionData, GatewayKind, GatewaySettings, GatewayTransactionStatus,
    PaymentDetails, PaymentMethod, PixTransaction, WebhookEvent,
};
use crate::gateways::vault::GatewayCredentials;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::info;

/// Documented SuitPay minimum charge, in centavos (R$5,00).
const MIN_AMOUNT_CENTS: i64 = 500;

const LIVE_BASE_URL: &str = "https://ws.suitpay.app/api/v1";
const SANDBOX_BASE_URL: &str = "https://sandbox.ws.suitpay.app/api/v1";

#[derive(Debug, Clone)]
pub struct SuitPayConfig {
    pub client_id: String,
    pub client_secret: String,
    pub webhook_secret: Option<String>,
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl SuitPayConfig {
    /// Build from vault-decrypted credentials plus the tenant's stored
    /// settings. SuitPay authenticates with a client id/secret header
    /// pair, so both halves are required.
    pub fn from_credentials(
        credentials: &GatewayCredentials,
        settings: &GatewaySettings,
    ) -> GatewayResult<Self> {
        if credentials.api_key.trim().is_empty() {
            return Err(GatewayError::CredentialError {
                message: "suitpay client id is missing".to_string(),
            });
        }
        let client_secret = credentials
            .api_secret
            .as_deref()
            .filter(|v| !v.trim().is_empty())
            .ok_or(GatewayError::CredentialError {
                message: "suitpay client secret is missing".to_string(),
            })?;

        let base_url = settings.base_url.clone().unwrap_or_else(|| {
            if settings.live_mode {
                LIVE_BASE_URL.to_string()
            } else {
                SANDBOX_BASE_URL.to_string()
            }
        });

        Ok(Self {
            client_id: credentials.api_key.clone(),
            client_secret: client_secret.to_string(),
            webhook_secret: credentials.webhook_secret.clone(),
            base_url,
            timeout_secs: 30,
            max_retries: 3,
        })
    }
}

pub struct SuitPayGateway {
    config: SuitPayConfig,
    http: GatewayHttpClient,
}

impl SuitPayGateway {
    pub fn new(config: SuitPayConfig) -> GatewayResult<Self> {
        let http = GatewayHttpClient::new(
            "suitpay",
            Duration::from_secs(config.timeout_secs),
            config.max_retries,
        )?;
        Ok(Self { config, http })
    }

    pub fn from_credentials(
        credentials: &GatewayCredentials,
        settings: &GatewaySettings,
    ) -> GatewayResult<Self> {
        Self::new(SuitPayConfig::from_credentials(credentials, settings)?)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    fn auth_headers(&self) -> [(&str, &str); 2] {
        [("ci", self.config.client_id.as_str()), ("cs", self.config.client_secret.as_str())]
    }

    fn webhook_signing_secret(&self) -> &str {
        self.config
            .webhook_secret
            .as_deref()
            .unwrap_or(&self.config.client_secret)
    }

    fn map_status(status: &str) -> GatewayTransactionStatus {
        match status.to_uppercase().as_str() {
            "WAITING_FOR_APPROVAL" | "PENDING" => GatewayTransactionStatus::Pending,
            "PAID_OUT" | "APPROVED" => GatewayTransactionStatus::Approved,
            "UNPAID" | "DECLINED" => GatewayTransactionStatus::Declined,
            "ERROR" => GatewayTransactionStatus::Failed,
            "EXPIRED" => GatewayTransactionStatus::Expired,
            "CANCELED" => GatewayTransactionStatus::Canceled,
            "CHARGEBACK" | "REFUNDED" => GatewayTransactionStatus::Refunded,
            _ => GatewayTransactionStatus::Unknown,
        }
    }
}

#[async_trait]
impl PaymentGateway for SuitPayGateway {
    fn kind(&self) -> GatewayKind {
        GatewayKind::SuitPay
    }

    async fn validate_credentials(&self) -> GatewayResult<bool> {
        let result: GatewayResult<SuitPayEnvelope> = self
            .http
            .request_json(
                reqwest::Method::GET,
                &self.endpoint("/gateway/check-credentials"),
                None,
                None,
                &self.auth_headers(),
            )
            .await;

        match result {
            Ok(envelope) => Ok(envelope.response == "OK"),
            Err(GatewayError::CommunicationError {
                status_code: 401 | 403,
                ..
            }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn create_pix_transaction(
        &self,
        data: CreateTransactionData,
    ) -> GatewayResult<PixTransaction> {
        if data.amount < MIN_AMOUNT_CENTS {
            return Err(GatewayError::AmountBelowMinimum {
                amount: data.amount,
                minimum: MIN_AMOUNT_CENTS,
            });
        }

        let products: Vec<JsonValue> = data
            .items
            .iter()
            .map(|item| {
                serde_json::json!({
                    "description": item.description,
                    "quantity": item.quantity,
                    "value": item.unit_amount,
                })
            })
            .collect();

        let payload = serde_json::json!({
            "requestNumber": data.reference,
            "amount": data.amount,
            "client": {
                "name": data.customer.name,
                "email": data.customer.email,
                "document": digits_only(&data.customer.document),
                "phoneNumber": data.customer.phone.as_deref().map(digits_only),
            },
            "products": products,
            "callbackUrl": data.postback_url,
        });

        let raw: SuitPayQrCodeData = self
            .http
            .request_json(
                reqwest::Method::POST,
                &self.endpoint("/gateway/request-qrcode"),
                None,
                Some(&payload),
                &self.auth_headers(),
            )
            .await?;

        if raw.response != "OK" {
            return Err(GatewayError::CommunicationError {
                gateway: "suitpay".to_string(),
                status_code: 200,
                body: raw.message.unwrap_or_else(|| raw.response.clone()),
                retryable: false,
            });
        }
        info!(transaction_id = %raw.id_transaction, "suitpay pix charge created");

        Ok(PixTransaction {
            id: raw.id_transaction,
            status: GatewayTransactionStatus::Pending,
            amount: data.amount,
            pix_code: raw.payment_code,
            pix_qr_code: raw.payment_code_base64,
            expires_at: None,
            metadata: serde_json::json!({ "request_number": data.reference }),
        })
    }

    async fn get_payment_details(&self, transaction_id: &str) -> GatewayResult<PaymentDetails> {
        let payload = serde_json::json!({ "idTransaction": transaction_id });
        let raw: SuitPayStatusData = self
            .http
            .request_json(
                reqwest::Method::POST,
                &self.endpoint("/gateway/consult-status"),
                None,
                Some(&payload),
                &self.auth_headers(),
            )
            .await?;

        Ok(PaymentDetails {
            id: transaction_id.to_string(),
            status: Self::map_status(&raw.status_transaction),
            amount: raw.amount.unwrap_or_default(),
            method: PaymentMethod::Pix,
            customer: None,
            created_at: raw.created_at,
            updated_at: raw.updated_at,
            metadata: serde_json::json!({ "status_transaction": raw.status_transaction }),
        })
    }

    fn validate_webhook(&self, payload: &[u8], signature: Option<&str>) -> bool {
        match signature {
            Some(signature) => {
                verify_hmac_sha512_hex(payload, self.webhook_signing_secret(), signature)
            }
            None => false,
        }
    }

    fn parse_webhook_event(&self, payload: &[u8]) -> GatewayResult<WebhookEvent> {
        let parsed: JsonValue =
            serde_json::from_slice(payload).map_err(|e| GatewayError::MalformedResponse {
                message: format!("invalid webhook JSON payload: {}", e),
            })?;

        let transaction_id = parsed
            .get("idTransaction")
            .and_then(|v| v.as_str())
            .filter(|v| !v.is_empty())
            .ok_or(GatewayError::MalformedResponse {
                message: "webhook payload has no idTransaction".to_string(),
            })?
            .to_string();

        let status_text = parsed
            .get("statusTransaction")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");

        Ok(WebhookEvent {
            gateway: GatewayKind::SuitPay,
            event_type: status_text.to_lowercase(),
            processor_transaction_id: transaction_id,
            status: Self::map_status(status_text),
            amount: parsed.get("value").and_then(|v| v.as_i64()),
            payload: parsed,
            received_at: chrono::Utc::now(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct SuitPayEnvelope {
    response: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SuitPayQrCodeData {
    response: String,
    #[serde(default)]
    message: Option<String>,
    id_transaction: String,
    #[serde(default)]
    payment_code: Option<String>,
    #[serde(default)]
    payment_code_base64: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SuitPayStatusData {
    status_transaction: String,
    #[serde(default)]
    amount: Option<i64>,
    #[serde(default)]
    created_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    updated_at: Option<chrono::DateTime<chrono::Utc>>,
}
