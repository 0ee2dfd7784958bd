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

/// Paggue rejects PIX charges under R$5,00.
const MIN_AMOUNT_CENTS: i64 = 500;

const LIVE_BASE_URL: &str = "https://ms.paggue.io";
const SANDBOX_BASE_URL: &str = "https://sandbox.ms.paggue.io";

#[derive(Debug, Clone)]
pub struct PaggueConfig {
    pub api_token: String,
    pub webhook_secret: Option<String>,
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl PaggueConfig {
    pub fn from_credentials(
        credentials: &GatewayCredentials,
        settings: &GatewaySettings,
    ) -> GatewayResult<Self> {
        if credentials.api_key.trim().is_empty() {
            return Err(GatewayError::CredentialError {
                message: "paggue api token is missing".to_string(),
            });
        }

        let base_url = settings.base_url.clone().unwrap_or_else(|| {
            if settings.live_mode {
                LIVE_BASE_URL.to_string()
            } else {
                SANDBOX_BASE_URL.to_string()
            }
        });

        // Paggue signs webhooks with a dedicated secret when one is
        // provisioned, otherwise with the api secret.
        let webhook_secret = credentials
            .webhook_secret
            .clone()
            .or_else(|| credentials.api_secret.clone());

        Ok(Self {
            api_token: credentials.api_key.clone(),
            webhook_secret,
            base_url,
            timeout_secs: 30,
            max_retries: 3,
        })
    }
}

pub struct PaggueGateway {
    config: PaggueConfig,
    http: GatewayHttpClient,
}

impl PaggueGateway {
    pub fn new(config: PaggueConfig) -> GatewayResult<Self> {
        let http = GatewayHttpClient::new(
            "paggue",
            Duration::from_secs(config.timeout_secs),
            config.max_retries,
        )?;
        Ok(Self { config, http })
    }

    pub fn from_credentials(
        credentials: &GatewayCredentials,
        settings: &GatewaySettings,
    ) -> GatewayResult<Self> {
        Self::new(PaggueConfig::from_credentials(credentials, settings)?)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    fn webhook_signing_secret(&self) -> &str {
        self.config
            .webhook_secret
            .as_deref()
            .unwrap_or(&self.config.api_token)
    }

    /// Paggue reports transaction state as a small integer.
    fn map_status(status: i64) -> GatewayTransactionStatus {
        match status {
            0 => GatewayTransactionStatus::Pending,
            1 => GatewayTransactionStatus::Approved,
            2 => GatewayTransactionStatus::Declined,
            3 => GatewayTransactionStatus::Expired,
            4 => GatewayTransactionStatus::Canceled,
            5 => GatewayTransactionStatus::Refunded,
            _ => GatewayTransactionStatus::Unknown,
        }
    }

    fn classify_rejection(error: GatewayError) -> GatewayError {
        let GatewayError::CommunicationError {
            gateway,
            status_code,
            body,
            retryable,
        } = error
        else {
            return error;
        };

        let lowered = body.to_lowercase();
        if lowered.contains("unauthenticated") || lowered.contains("invalid token") {
            return GatewayError::CredentialError {
                message: "paggue rejected the api token".to_string(),
            };
        }
        if lowered.contains("too many attempts") {
            return GatewayError::RateLimited {
                message: body,
                retry_after_seconds: None,
            };
        }
        GatewayError::CommunicationError {
            gateway,
            status_code,
            body,
            retryable,
        }
    }
}

#[async_trait]
impl PaymentGateway for PaggueGateway {
    fn kind(&self) -> GatewayKind {
        GatewayKind::Paggue
    }

    async fn validate_credentials(&self) -> GatewayResult<bool> {
        let result: GatewayResult<PaggueCompanyData> = self
            .http
            .request_json(
                reqwest::Method::GET,
                &self.endpoint("/cashin/api/company"),
                Some(&self.config.api_token),
                None,
                &[],
            )
            .await;

        match result.map_err(Self::classify_rejection) {
            Ok(_) => Ok(true),
            Err(GatewayError::CredentialError { .. }) => Ok(false),
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

        let description = data
            .items
            .first()
            .map(|item| item.description.clone())
            .unwrap_or_else(|| "Pedido".to_string());

        let payload = serde_json::json!({
            "external_id": data.reference,
            "amount": data.amount,
            "description": description,
            "payer_name": data.customer.name,
            "payer_document": digits_only(&data.customer.document),
            "payer_email": data.customer.email,
            "postback_url": data.postback_url,
        });

        let raw: PaggueBillingOrder = self
            .http
            .request_json(
                reqwest::Method::POST,
                &self.endpoint("/cashin/api/billing_order"),
                Some(&self.config.api_token),
                Some(&payload),
                &[],
            )
            .await
            .map_err(Self::classify_rejection)?;
        info!(transaction_id = %raw.id, "paggue billing order created");

        Ok(PixTransaction {
            id: raw.id,
            status: Self::map_status(raw.status),
            amount: raw.amount.unwrap_or(data.amount),
            pix_code: raw.payment_code,
            pix_qr_code: raw.qr_code_base64,
            expires_at: raw.expiration_at,
            metadata: serde_json::json!({ "external_id": data.reference }),
        })
    }

    async fn get_payment_details(&self, transaction_id: &str) -> GatewayResult<PaymentDetails> {
        let raw: PaggueBillingOrder = self
            .http
            .request_json(
                reqwest::Method::GET,
                &self.endpoint(&format!("/cashin/api/billing_order/{}", transaction_id)),
                Some(&self.config.api_token),
                None,
                &[],
            )
            .await
            .map_err(Self::classify_rejection)?;

        Ok(PaymentDetails {
            id: raw.id,
            status: Self::map_status(raw.status),
            amount: raw.amount.unwrap_or_default(),
            method: PaymentMethod::Pix,
            customer: None,
            created_at: raw.created_at,
            updated_at: raw.paid_at,
            metadata: serde_json::json!({ "raw_status": raw.status }),
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

        let transaction_id = match parsed.get("id") {
            Some(JsonValue::String(s)) if !s.is_empty() => s.clone(),
            Some(JsonValue::Number(n)) => n.to_string(),
            _ => {
                return Err(GatewayError::MalformedResponse {
                    message: "webhook payload has no billing order id".to_string(),
                })
            }
        };

        let raw_status = parsed
            .get("status")
            .and_then(|v| v.as_i64())
            .unwrap_or(i64::MIN);

        Ok(WebhookEvent {
            gateway: GatewayKind::Paggue,
            event_type: "billing_order.updated".to_string(),
            processor_transaction_id: transaction_id,
            status: Self::map_status(raw_status),
            amount: parsed.get("amount").and_then(|v| v.as_i64()),
            payload: parsed,
            received_at: chrono::Utc::now(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct PaggueBillingOrder {
    id: String,
    status: i64,
    #[serde(default)]
    amount: Option<i64>,
    #[serde(default)]
    payment_code: Option<String>,
    #[serde(default)]
    qr_code_base64: Option<String>,
    #[serde(default)]
    expiration_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    created_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    paid_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Deserialize)]
struct PaggueCompanyData {
    #[allow(dead_code)]
    id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateways::http::hmac_sha512_hex;
    use crate::gateways::types::CustomerInfo;

    fn gateway() -> PaggueGateway {
        PaggueGateway::new(PaggueConfig {
            api_token: "pg_test_token".to_string(),
            webhook_secret: Some("pg_whsec".to_string()),
            base_url: "http://127.0.0.1:9".to_string(),
            timeout_secs: 2,
            max_retries: 0,
        })
        .expect("gateway init should succeed")
    }

    fn transaction_data(amount: i64) -> CreateTransactionData {
        CreateTransactionData {
            campaign_id: uuid::Uuid::nil(),
            user_id: uuid::Uuid::nil(),
            amount,
            customer: CustomerInfo {
                name: "Joao Lima".to_string(),
                email: "joao@example.com".to_string(),
                document: "987.654.321-00".to_string(),
                phone: None,
            },
            items: vec![],
            reference: "PAY-TEST-2".to_string(),
            postback_url: None,
        }
    }

    #[test]
    fn config_requires_api_token() {
        let credentials = GatewayCredentials {
            api_key: "".to_string(),
            api_secret: None,
            webhook_secret: None,
        };
        assert!(matches!(
            PaggueConfig::from_credentials(&credentials, &GatewaySettings::default()),
            Err(GatewayError::CredentialError { .. })
        ));
    }

    #[test]
    fn webhook_secret_falls_back_to_api_secret() {
        let credentials = GatewayCredentials {
            api_key: "pg_token".to_string(),
            api_secret: Some("pg_secret".to_string()),
            webhook_secret: None,
        };
        let config = PaggueConfig::from_credentials(&credentials, &GatewaySettings::default())
            .expect("config should build");
        assert_eq!(config.webhook_secret.as_deref(), Some("pg_secret"));
    }

    #[tokio::test]
    async fn amount_below_minimum_fails_before_any_network_call() {
        let gateway = gateway();
        let result = gateway.create_pix_transaction(transaction_data(499)).await;
        assert!(matches!(
            result,
            Err(GatewayError::AmountBelowMinimum {
                amount: 499,
                minimum: 500
            })
        ));
    }

    #[test]
    fn webhook_signature_validation() {
        let gateway = gateway();
        let payload = br#"{"id":"bo_1","status":1,"amount":1500}"#;

        let signature = hmac_sha512_hex(payload, "pg_whsec");
        assert!(gateway.validate_webhook(payload, Some(&signature)));
        assert!(!gateway.validate_webhook(payload, Some(&signature[1..])));
        assert!(!gateway.validate_webhook(payload, None));
    }

    #[test]
    fn webhook_event_accepts_numeric_order_id() {
        let gateway = gateway();
        let event = gateway
            .parse_webhook_event(br#"{"id":4821,"status":1,"amount":1500}"#)
            .expect("event should parse");
        assert_eq!(event.processor_transaction_id, "4821");
        assert_eq!(event.status, GatewayTransactionStatus::Approved);
        assert_eq!(event.amount, Some(1500));
    }

    #[test]
    fn webhook_event_without_order_id_is_rejected() {
        let gateway = gateway();
        let result = gateway.parse_webhook_event(br#"{"status":1}"#);
        assert!(matches!(result, Err(GatewayError::MalformedResponse { .. })));
    }

    #[test]
    fn status_codes_map_to_transaction_states() {
        assert_eq!(PaggueGateway::map_status(0), GatewayTransactionStatus::Pending);
        assert_eq!(PaggueGateway::map_status(1), GatewayTransactionStatus::Approved);
        assert_eq!(PaggueGateway::map_status(3), GatewayTransactionStatus::Expired);
        assert_eq!(PaggueGateway::map_status(5), GatewayTransactionStatus::Refunded);
        assert_eq!(PaggueGateway::map_status(99), GatewayTransactionStatus::Unknown);
    }

    #[test]
    fn rejection_classifier_detects_credential_failures() {
        let classified = PaggueGateway::classify_rejection(GatewayError::CommunicationError {
            gateway: "paggue".to_string(),
            status_code: 401,
            body: r#"{"message":"Unauthenticated."}"#.to_string(),
            retryable: false,
        });
        assert!(matches!(classified, GatewayError::CredentialError { .. }));

        let passthrough = PaggueGateway::classify_rejection(GatewayError::CommunicationError {
            gateway: "paggue".to_string(),
            status_code: 422,
            body: "validation failed".to_string(),
            retryable: false,
        });
        assert!(matches!(
            passthrough,
            GatewayError::CommunicationError { status_code: 422, .. }
        ));
    }
}
