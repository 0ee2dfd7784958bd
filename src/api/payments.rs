use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::IntoResponse,
};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::database::payment_store::Payment;
use crate::error::{AppError, AppErrorKind, ValidationError};
use crate::gateways::manager::GatewayManager;
use crate::gateways::types::{CustomerInfo, LineItem};
use crate::middleware::error::{get_request_id_from_headers, success_response};
use crate::services::payment_lifecycle::{CreatePaymentRequest, PaymentLifecycle};

#[derive(Clone)]
pub struct PaymentApiState {
    pub manager: Arc<GatewayManager>,
    pub lifecycle: Arc<PaymentLifecycle>,
}

#[derive(Debug, Deserialize)]
pub struct CreatePaymentApiRequest {
    pub tenant_id: Uuid,
    pub campaign_id: Uuid,
    pub user_id: Uuid,
    /// Charge amount in centavos.
    pub amount: i64,
    /// Seller-borne fee in centavos.
    #[serde(default)]
    pub tax_seller: i64,
    pub customer: CustomerInfo,
    #[serde(default)]
    pub items: Vec<LineItem>,
    pub idempotency_key: Option<String>,
    /// Charge through a specific gateway configuration instead of the
    /// tenant default.
    pub gateway_config_id: Option<Uuid>,
    pub postback_url: Option<String>,
}

/// Client-facing projection of a payment record.
#[derive(Debug, Serialize)]
pub struct PaymentResponse {
    pub id: Uuid,
    pub payment_code: String,
    pub campaign_id: Uuid,
    pub status: String,
    pub method: String,
    pub gateway_kind: String,
    pub amount: i64,
    pub tax_platform: i64,
    pub tax_seller: i64,
    pub amount_received: i64,
    pub pix_code: Option<String>,
    pub pix_qr_code: Option<String>,
    pub purchase_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl From<Payment> for PaymentResponse {
    fn from(payment: Payment) -> Self {
        Self {
            id: payment.id,
            payment_code: payment.payment_code,
            campaign_id: payment.campaign_id,
            status: payment.status,
            method: payment.method,
            gateway_kind: payment.gateway_kind,
            amount: payment.amount,
            tax_platform: payment.tax_platform,
            tax_seller: payment.tax_seller,
            amount_received: payment.amount_received,
            pix_code: payment.pix_code,
            pix_qr_code: payment.pix_qr_code,
            purchase_at: payment.purchase_at,
            expires_at: payment.expires_at,
            paid_at: payment.paid_at,
        }
    }
}

/// POST /api/v1/payments
pub async fn create_payment(
    State(state): State<PaymentApiState>,
    headers: HeaderMap,
    Json(payload): Json<CreatePaymentApiRequest>,
) -> Result<impl IntoResponse, AppError> {
    let request_id = get_request_id_from_headers(&headers);
    let attach_request_id = |err: AppError| match &request_id {
        Some(id) => err.with_request_id(id.clone()),
        None => err,
    };

    if payload.customer.name.trim().is_empty() {
        return Err(attach_request_id(missing_field("customer.name")));
    }
    if payload.customer.email.trim().is_empty() {
        return Err(attach_request_id(missing_field("customer.email")));
    }
    if payload.customer.document.trim().is_empty() {
        return Err(attach_request_id(missing_field("customer.document")));
    }

    info!(
        tenant_id = %payload.tenant_id,
        campaign_id = %payload.campaign_id,
        amount = payload.amount,
        has_idempotency_key = payload.idempotency_key.is_some(),
        "payment creation requested"
    );

    let resolved = match payload.gateway_config_id {
        Some(config_id) => state.manager.gateway_by_id(payload.tenant_id, config_id).await,
        None => state.manager.default_gateway(payload.tenant_id).await,
    }
    .map_err(attach_request_id)?;

    let request = CreatePaymentRequest {
        tenant_id: payload.tenant_id,
        campaign_id: payload.campaign_id,
        user_id: payload.user_id,
        amount: payload.amount,
        tax_seller: payload.tax_seller,
        customer: payload.customer,
        items: payload.items,
        idempotency_key: payload.idempotency_key,
        postback_url: payload.postback_url,
    };

    let payment = state
        .lifecycle
        .create_payment(resolved.adapter.as_ref(), Some(resolved.config.id), request)
        .await
        .map_err(|e| {
            let err: AppError = e.into();
            match &request_id {
                Some(id) => err.with_request_id(id.clone()),
                None => err,
            }
        })?;

    Ok(success_response(PaymentResponse::from(payment)))
}

/// GET /api/v1/payments/{payment_code}
pub async fn get_payment(
    State(state): State<PaymentApiState>,
    Path(payment_code): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let request_id = get_request_id_from_headers(&headers);

    let payment = state
        .lifecycle
        .get_payment(&payment_code)
        .await
        .map_err(|e| {
            let err: AppError = e.into();
            match &request_id {
                Some(id) => err.with_request_id(id.clone()),
                None => err,
            }
        })?;

    Ok(success_response(PaymentResponse::from(payment)))
}

fn missing_field(field: &str) -> AppError {
    AppError::new(AppErrorKind::Validation(ValidationError::MissingField {
        field: field.to_string(),
    }))
}
