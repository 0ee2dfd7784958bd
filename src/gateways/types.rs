use crate::gateways::error::GatewayError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum GatewayKind {
    SuitPay,
    Paggue,
}

impl GatewayKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayKind::SuitPay => "suitpay",
            GatewayKind::Paggue => "paggue",
        }
    }
}

impl std::fmt::Display for GatewayKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for GatewayKind {
    type Err = GatewayError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "suitpay" | "suit_pay" => Ok(GatewayKind::SuitPay),
            "paggue" => Ok(GatewayKind::Paggue),
            _ => Err(GatewayError::UnsupportedGateway {
                kind: value.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Pix,
    CreditCard,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Pix => "pix",
            PaymentMethod::CreditCard => "credit_card",
        }
    }

    pub fn from_db_str(value: &str) -> Option<Self> {
        match value {
            "pix" => Some(PaymentMethod::Pix),
            "credit_card" => Some(PaymentMethod::CreditCard),
            _ => None,
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Transaction status as reported by a processor, normalized across
/// gateways. The lifecycle maps this onto its own state machine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GatewayTransactionStatus {
    Pending,
    Approved,
    Declined,
    Failed,
    Expired,
    Canceled,
    Refunded,
    Unknown,
}

/// Per-tenant gateway settings stored alongside the encrypted credentials.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GatewaySettings {
    /// Override for the processor base URL (sandbox endpoints, proxies).
    pub base_url: Option<String>,
    #[serde(default)]
    pub live_mode: bool,
    #[serde(default)]
    pub enabled_methods: Vec<PaymentMethod>,
    pub webhook_url: Option<String>,
}

/// Customer data captured at purchase time. Stored as an immutable
/// snapshot on the Payment, independent of later profile edits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CustomerInfo {
    pub name: String,
    pub email: String,
    pub document: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LineItem {
    pub description: String,
    pub quantity: i32,
    pub unit_amount: i64,
}

/// Normalized input for creating a processor transaction. Adapters
/// translate this into their own wire format, including phone and
/// document digit normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTransactionData {
    pub campaign_id: uuid::Uuid,
    pub user_id: uuid::Uuid,
    /// Minor currency units (centavos).
    pub amount: i64,
    pub customer: CustomerInfo,
    pub items: Vec<LineItem>,
    /// Our reference sent to the processor, echoed back in webhooks.
    pub reference: String,
    pub postback_url: Option<String>,
}

/// Result of creating a PIX transaction at a processor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PixTransaction {
    pub id: String,
    pub status: GatewayTransactionStatus,
    pub amount: i64,
    pub pix_code: Option<String>,
    pub pix_qr_code: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub metadata: JsonValue,
}

/// Processor-side view of an existing transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentDetails {
    pub id: String,
    pub status: GatewayTransactionStatus,
    pub amount: i64,
    pub method: PaymentMethod,
    pub customer: Option<CustomerInfo>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub metadata: JsonValue,
}

/// A processor webhook, parsed and normalized by the owning adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub gateway: GatewayKind,
    pub event_type: String,
    pub processor_transaction_id: String,
    pub status: GatewayTransactionStatus,
    pub amount: Option<i64>,
    pub payload: JsonValue,
    pub received_at: DateTime<Utc>,
}

/// Strip everything but ASCII digits; processors want bare CPF/CNPJ and
/// phone numbers.
pub fn digits_only(input: &str) -> String {
    input.chars().filter(|c| c.is_ascii_digit()).collect()
}
