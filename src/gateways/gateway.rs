use crate::gateways::error::GatewayResult;
use crate::gateways::types::{
    CreateTransactionData, GatewayKind, PaymentDetails, PixTransaction, WebhookEvent,
};
use async_trait::async_trait;

/// One implementation per external payment processor.
///
/// An adapter owns its processor's wire format, authentication scheme and
/// webhook signing; everything it exchanges with the rest of the system is
/// the normalized shapes from [`crate::gateways::types`].
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn kind(&self) -> GatewayKind;

    /// Check the configured credentials against the processor, without
    /// creating anything.
    async fn validate_credentials(&self) -> GatewayResult<bool>;

    /// Create a PIX charge. Must reject amounts below the processor's
    /// documented minimum before any network call.
    async fn create_pix_transaction(
        &self,
        data: CreateTransactionData,
    ) -> GatewayResult<PixTransaction>;

    async fn get_payment_details(&self, transaction_id: &str) -> GatewayResult<PaymentDetails>;

    /// Whether an inbound webhook body carries a valid signature for this
    /// gateway's credentials. Pure computation, no I/O.
    fn validate_webhook(&self, payload: &[u8], signature: Option<&str>) -> bool;

    /// Parse a (previously validated) webhook body into the normalized
    /// event shape.
    fn parse_webhook_event(&self, payload: &[u8]) -> GatewayResult<WebhookEvent>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateways::types::{CustomerInfo, GatewayTransactionStatus, PaymentMethod};

    struct MockGateway;

    #[async_trait]
    impl PaymentGateway for MockGateway {
        fn kind(&self) -> GatewayKind {
            GatewayKind::SuitPay
        }

        async fn validate_credentials(&self) -> GatewayResult<bool> {
            Ok(true)
        }

        async fn create_pix_transaction(
            &self,
            data: CreateTransactionData,
        ) -> GatewayResult<PixTransaction> {
            Ok(PixTransaction {
                id: "mock_tx_1".to_string(),
                status: GatewayTransactionStatus::Pending,
                amount: data.amount,
                pix_code: Some("00020126mockpixpayload".to_string()),
                pix_qr_code: Some("data:image/png;base64,mock".to_string()),
                expires_at: None,
                metadata: serde_json::json!({"reference": data.reference}),
            })
        }

        async fn get_payment_details(
            &self,
            transaction_id: &str,
        ) -> GatewayResult<PaymentDetails> {
            Ok(PaymentDetails {
                id: transaction_id.to_string(),
                status: GatewayTransactionStatus::Approved,
                amount: 2500,
                method: PaymentMethod::Pix,
                customer: None,
                created_at: None,
                updated_at: None,
                metadata: serde_json::json!({}),
            })
        }

        fn validate_webhook(&self, _payload: &[u8], signature: Option<&str>) -> bool {
            signature == Some("valid")
        }

        fn parse_webhook_event(&self, payload: &[u8]) -> GatewayResult<WebhookEvent> {
            Ok(WebhookEvent {
                gateway: GatewayKind::SuitPay,
                event_type: "payment.approved".to_string(),
                processor_transaction_id: "mock_tx_1".to_string(),
                status: GatewayTransactionStatus::Approved,
                amount: Some(2500),
                payload: serde_json::from_slice(payload).unwrap_or_default(),
                received_at: chrono::Utc::now(),
            })
        }
    }

    #[tokio::test]
    async fn trait_can_be_implemented_by_mock_gateway() {
        let gateway: Box<dyn PaymentGateway> = Box::new(MockGateway);

        let transaction = gateway
            .create_pix_transaction(CreateTransactionData {
                campaign_id: uuid::Uuid::nil(),
                user_id: uuid::Uuid::nil(),
                amount: 2500,
                customer: CustomerInfo {
                    name: "Test".to_string(),
                    email: "test@example.com".to_string(),
                    document: "12345678909".to_string(),
                    phone: None,
                },
                items: vec![],
                reference: "PAY-1".to_string(),
                postback_url: None,
            })
            .await
            .expect("transaction creation should succeed");
        assert_eq!(transaction.status, GatewayTransactionStatus::Pending);
        assert_eq!(transaction.amount, 2500);

        assert!(gateway.validate_webhook(b"{}", Some("valid")));
        assert!(!gateway.validate_webhook(b"{}", None));

        let event = gateway
            .parse_webhook_event(br#"{"ok":true}"#)
            .expect("event parsing should succeed");
        assert_eq!(event.status, GatewayTransactionStatus::Approved);
    }
}
