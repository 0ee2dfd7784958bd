//! PIX webhook ingress.
//!
//! Payment processors retry deliveries on non-2xx responses, so every
//! outcome that screening or the state machine can produce is answered
//! with a neutral 200. Only infrastructure failures surface as errors,
//! which tells the processor to deliver again later.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::services::webhook_processor::{WebhookDisposition, WebhookProcessor};

/// Signature headers used by the supported processors, checked in order.
const SIGNATURE_HEADERS: [&str; 4] = [
    "x-paggue-signature",
    "x-suitpay-signature",
    "x-signature",
    "x-webhook-signature",
];

#[derive(Clone)]
pub struct WebhookApiState {
    pub processor: Arc<WebhookProcessor>,
}

/// POST /webhooks/pix/{tenant_id}
pub async fn receive_pix_webhook(
    State(state): State<WebhookApiState>,
    Path(tenant_id): Path<Uuid>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let signature = extract_signature(&headers);

    info!(
        tenant_id = %tenant_id,
        body_bytes = body.len(),
        has_signature = signature.is_some(),
        "pix webhook received"
    );

    let disposition = state.processor.process(tenant_id, &body, signature).await?;

    // Forged and unusable deliveries get the same acknowledgement as
    // applied ones; the distinction lives in the logs.
    let ack = match disposition {
        WebhookDisposition::Applied { .. }
        | WebhookDisposition::Duplicate { .. }
        | WebhookDisposition::Dropped { .. } => json!({"received": true}),
    };

    Ok((StatusCode::OK, Json(ack)))
}

fn extract_signature(headers: &HeaderMap) -> Option<&str> {
    SIGNATURE_HEADERS
        .iter()
        .find_map(|name| headers.get(*name).and_then(|value| value.to_str().ok()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn picks_the_first_known_signature_header() {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        headers.insert("x-signature", HeaderValue::from_static("generic"));
        headers.insert("x-paggue-signature", HeaderValue::from_static("paggue"));

        assert_eq!(extract_signature(&headers), Some("paggue"));
    }

    #[test]
    fn missing_signature_headers_yield_none() {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        assert_eq!(extract_signature(&headers), None);
    }
}
