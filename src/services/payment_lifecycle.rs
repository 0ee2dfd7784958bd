//! Payment Lifecycle Service
//!
//! Owns the payment state machine: creation with idempotency, processor
//! confirmation via webhooks, manual cancel/refund edges, and expiration
//! of abandoned PIX charges. Every transition is a single conditional
//! store write, so concurrent webhooks, sweeps, and operators cannot
//! corrupt a record.

use crate::codes::CodeGenerator;
use crate::database::error::DatabaseError;
use crate::database::payment_store::{
    InitializationDetails, NewPayment, Payment, PaymentStore,
};
use crate::error::{AppError, AppErrorKind, DomainError, InfrastructureError, ValidationError};
use crate::gateways::error::GatewayError;
use crate::gateways::gateway::PaymentGateway;
use crate::gateways::types::{
    CreateTransactionData, CustomerInfo, GatewayTransactionStatus, LineItem,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for the payment lifecycle service
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Minutes a PIX charge stays payable before the sweep expires it
    pub pix_expiration_minutes: i64,
    /// Platform cut taken from every payment, in basis points
    pub platform_fee_bps: u32,
    /// Prefix stamped onto generated payment codes
    pub code_prefix: String,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            pix_expiration_minutes: 10,
            platform_fee_bps: 0,
            code_prefix: "PAY".to_string(),
        }
    }
}

// ============================================================================
// Payment State Machine
// ============================================================================

/// Payment lifecycle state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Recorded locally, processor not yet involved
    Pending,
    /// Processor accepted the charge and issued payment artifacts
    Initialized,
    /// Funds confirmed by the processor
    Approved,
    /// Processor declined the charge
    Declined,
    /// Processor or infrastructure failure during initialization
    Failed,
    /// PIX window elapsed without confirmation
    Expired,
    /// Canceled by the buyer or an operator
    Canceled,
    /// Approved payment returned to the buyer
    Refunded,
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.to_db_status())
    }
}

impl PaymentStatus {
    /// Get all valid transitions from this state
    pub fn valid_transitions(&self) -> Vec<PaymentStatus> {
        match self {
            PaymentStatus::Pending => vec![
                PaymentStatus::Initialized,
                PaymentStatus::Failed,
                PaymentStatus::Expired,
                PaymentStatus::Canceled,
            ],
            PaymentStatus::Initialized => vec![
                PaymentStatus::Approved,
                PaymentStatus::Declined,
                PaymentStatus::Failed,
                PaymentStatus::Expired,
                PaymentStatus::Canceled,
            ],
            PaymentStatus::Approved => vec![PaymentStatus::Refunded],
            // Terminal states - no valid transitions
            PaymentStatus::Declined
            | PaymentStatus::Failed
            | PaymentStatus::Expired
            | PaymentStatus::Canceled
            | PaymentStatus::Refunded => vec![],
        }
    }

    pub fn can_transition_to(&self, target: PaymentStatus) -> bool {
        self.valid_transitions().contains(&target)
    }

    /// Check if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Declined
                | PaymentStatus::Failed
                | PaymentStatus::Expired
                | PaymentStatus::Canceled
                | PaymentStatus::Refunded
        )
    }

    /// Convert from database status string
    pub fn from_db_status(status: &str) -> Option<Self> {
        match status.to_lowercase().as_str() {
            "pending" => Some(PaymentStatus::Pending),
            "initialized" => Some(PaymentStatus::Initialized),
            "approved" => Some(PaymentStatus::Approved),
            "declined" => Some(PaymentStatus::Declined),
            "failed" => Some(PaymentStatus::Failed),
            "expired" => Some(PaymentStatus::Expired),
            "canceled" => Some(PaymentStatus::Canceled),
            "refunded" => Some(PaymentStatus::Refunded),
            _ => None,
        }
    }

    /// Convert to database status string
    pub fn to_db_status(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Initialized => "initialized",
            PaymentStatus::Approved => "approved",
            PaymentStatus::Declined => "declined",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Expired => "expired",
            PaymentStatus::Canceled => "canceled",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

// ============================================================================
// Requests & Outcomes
// ============================================================================

/// Fields a caller supplies to create a payment
#[derive(Debug, Clone)]
pub struct CreatePaymentRequest {
    pub tenant_id: Uuid,
    pub campaign_id: Uuid,
    pub user_id: Uuid,
    /// Charge amount in centavos
    pub amount: i64,
    /// Seller-borne fee in centavos, snapshotted at creation
    pub tax_seller: i64,
    pub customer: CustomerInfo,
    pub items: Vec<LineItem>,
    pub idempotency_key: Option<String>,
    pub postback_url: Option<String>,
}

/// Result of applying a processor webhook to a payment
#[derive(Debug)]
pub enum WebhookOutcome {
    /// The payment moved to a new state
    Transitioned(Payment),
    /// Replay of an event already applied; record untouched
    AlreadyApplied(Payment),
    /// Event carried no actionable state (e.g. still pending)
    Ignored(Payment),
}

impl WebhookOutcome {
    pub fn payment(&self) -> &Payment {
        match self {
            WebhookOutcome::Transitioned(p)
            | WebhookOutcome::AlreadyApplied(p)
            | WebhookOutcome::Ignored(p) => p,
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("payment cannot move from '{from}' to '{to}'")]
    InvalidStateTransition {
        from: PaymentStatus,
        to: PaymentStatus,
    },

    #[error("payment {reference} not found")]
    PaymentNotFound { reference: String },

    #[error("payment code '{code}' failed validation")]
    InvalidPaymentCode { code: String },

    #[error("invalid amount {amount}: {reason}")]
    InvalidAmount { amount: i64, reason: String },

    #[error("stored payment status '{status}' is not recognized")]
    UnknownStoredStatus { status: String },
}

impl From<LifecycleError> for AppError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::Database(e) => e.into(),
            LifecycleError::Gateway(e) => e.into(),
            LifecycleError::InvalidStateTransition { from, to } => {
                AppError::new(AppErrorKind::Domain(DomainError::InvalidStateTransition {
                    from: from.to_db_status().to_string(),
                    to: to.to_db_status().to_string(),
                }))
            }
            LifecycleError::PaymentNotFound { reference } => {
                AppError::new(AppErrorKind::Domain(DomainError::PaymentNotFound {
                    reference,
                }))
            }
            LifecycleError::InvalidPaymentCode { code } => AppError::new(AppErrorKind::Validation(
                ValidationError::MalformedPaymentCode { code },
            )),
            LifecycleError::InvalidAmount { amount, reason } => AppError::new(
                AppErrorKind::Validation(ValidationError::InvalidAmount {
                    amount: amount.to_string(),
                    reason,
                }),
            ),
            LifecycleError::UnknownStoredStatus { status } => {
                AppError::new(AppErrorKind::Infrastructure(InfrastructureError::Database {
                    message: format!("payment row carries unknown status '{}'", status),
                    is_retryable: false,
                }))
            }
        }
    }
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;

// ============================================================================
// Service
// ============================================================================

/// Payment lifecycle service
pub struct PaymentLifecycle {
    store: Arc<dyn PaymentStore>,
    codes: Arc<CodeGenerator>,
    config: LifecycleConfig,
}

impl PaymentLifecycle {
    pub fn new(
        store: Arc<dyn PaymentStore>,
        codes: Arc<CodeGenerator>,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            store,
            codes,
            config,
        }
    }

    /// Create a PIX payment through the given gateway adapter.
    ///
    /// When the request carries an idempotency key that was seen before,
    /// the original payment is returned and the gateway is not contacted.
    /// Otherwise the record is inserted as `pending`, the charge is placed
    /// with the processor, and acceptance upgrades it to `initialized`.
    pub async fn create_payment(
        &self,
        adapter: &dyn PaymentGateway,
        gateway_config_id: Option<Uuid>,
        request: CreatePaymentRequest,
    ) -> LifecycleResult<Payment> {
        if request.amount <= 0 {
            return Err(LifecycleError::InvalidAmount {
                amount: request.amount,
                reason: "amount must be positive".to_string(),
            });
        }

        if let Some(key) = &request.idempotency_key {
            if let Some(existing) = self
                .store
                .find_by_idempotency_key(request.tenant_id, key)
                .await?
            {
                info!(
                    payment_id = %existing.id,
                    idempotency_key = %key,
                    "returning existing payment for replayed idempotency key"
                );
                return Ok(existing);
            }
        }

        let purchase_at = Utc::now();
        let expires_at = purchase_at + Duration::minutes(self.config.pix_expiration_minutes);
        let payment_code = self.codes.generate(
            Some(&request.campaign_id.to_string()),
            &self.config.code_prefix,
        );

        let tax_platform = platform_fee(request.amount, self.config.platform_fee_bps);
        let amount_received = request.amount - tax_platform - request.tax_seller;

        let new_payment = NewPayment {
            tenant_id: request.tenant_id,
            campaign_id: request.campaign_id,
            user_id: request.user_id,
            payment_code: payment_code.clone(),
            idempotency_key: request.idempotency_key.clone(),
            gateway_kind: adapter.kind().as_str().to_string(),
            gateway_config_id,
            method: "pix".to_string(),
            status: PaymentStatus::Pending.to_db_status().to_string(),
            amount: request.amount,
            tax_platform,
            tax_seller: request.tax_seller,
            amount_received,
            purchase_at,
            expires_at: Some(expires_at),
            metadata: serde_json::json!({}),
        };

        let payment = match self.store.insert(new_payment).await {
            Ok(payment) => payment,
            // Two requests with the same idempotency key can race past the
            // lookup above; the unique index picks the winner and the loser
            // re-fetches it here.
            Err(e) if e.is_unique_violation() && request.idempotency_key.is_some() => {
                let key = request.idempotency_key.as_deref().unwrap_or_default();
                return self
                    .store
                    .find_by_idempotency_key(request.tenant_id, key)
                    .await?
                    .ok_or(LifecycleError::Database(e));
            }
            Err(e) => return Err(e.into()),
        };

        let transaction_data = CreateTransactionData {
            campaign_id: request.campaign_id,
            user_id: request.user_id,
            amount: request.amount,
            customer: request.customer,
            items: request.items,
            reference: payment_code.clone(),
            postback_url: request.postback_url,
        };

        let pix = match adapter.create_pix_transaction(transaction_data).await {
            Ok(pix) => pix,
            Err(e) => {
                warn!(
                    payment_id = %payment.id,
                    gateway = %adapter.kind(),
                    error = %e,
                    "gateway rejected pix charge, marking payment failed"
                );
                self.store
                    .update_status_if(
                        payment.id,
                        &[PaymentStatus::Pending.to_db_status()],
                        PaymentStatus::Failed.to_db_status(),
                        None,
                    )
                    .await?;
                return Err(e.into());
            }
        };

        let initialized = self
            .store
            .mark_initialized(
                payment.id,
                InitializationDetails {
                    processor_transaction_id: pix.id.clone(),
                    pix_code: pix.pix_code.clone(),
                    pix_qr_code: pix.pix_qr_code.clone(),
                },
            )
            .await?;

        if let Some(processor_expiry) = pix.expires_at {
            // The local window in expires_at stays authoritative; the
            // processor's own deadline is kept for support tooling.
            self.store
                .append_metadata(
                    payment.id,
                    &serde_json::json!({ "processor_expires_at": processor_expiry }),
                )
                .await?;
        }

        match initialized {
            Some(payment) => {
                info!(
                    payment_id = %payment.id,
                    payment_code = %payment.payment_code,
                    gateway = %adapter.kind(),
                    amount = payment.amount,
                    "pix payment initialized"
                );
                Ok(payment)
            }
            None => {
                // The row left `pending` while the processor call was in
                // flight (sweep or manual cancel). Return it as it now is.
                warn!(payment_id = %payment.id, "payment left pending during initialization");
                self.store
                    .find_by_id(payment.id)
                    .await?
                    .ok_or(LifecycleError::PaymentNotFound {
                        reference: payment.id.to_string(),
                    })
            }
        }
    }

    /// Look up a payment by its public code.
    ///
    /// The code is structurally validated (including its embedded
    /// checksum) before the store is consulted, so forged or mistyped
    /// codes fail closed without a query.
    pub async fn get_payment(&self, payment_code: &str) -> LifecycleResult<Payment> {
        if !self.codes.validate(payment_code) {
            return Err(LifecycleError::InvalidPaymentCode {
                code: payment_code.to_string(),
            });
        }

        self.store
            .find_by_payment_code(payment_code)
            .await?
            .ok_or(LifecycleError::PaymentNotFound {
                reference: payment_code.to_string(),
            })
    }

    /// Apply a validated processor webhook to the payment it references.
    ///
    /// Replays of an already-applied event return the record unchanged;
    /// events that would move a payment backwards or out of a terminal
    /// state are conflicts and leave the record untouched.
    pub async fn apply_webhook_event(
        &self,
        tenant_id: Uuid,
        processor_transaction_id: &str,
        gateway_status: GatewayTransactionStatus,
    ) -> LifecycleResult<WebhookOutcome> {
        let payment = self
            .store
            .find_by_processor_transaction_id(tenant_id, processor_transaction_id)
            .await?
            .ok_or(LifecycleError::PaymentNotFound {
                reference: processor_transaction_id.to_string(),
            })?;

        let current = PaymentStatus::from_db_status(&payment.status).ok_or(
            LifecycleError::UnknownStoredStatus {
                status: payment.status.clone(),
            },
        )?;

        let Some(target) = webhook_target_status(gateway_status) else {
            return Ok(WebhookOutcome::Ignored(payment));
        };

        if current == target {
            info!(
                payment_id = %payment.id,
                status = %current,
                "webhook replay for already-applied status, nothing to do"
            );
            return Ok(WebhookOutcome::AlreadyApplied(payment));
        }

        if !current.can_transition_to(target) {
            return Err(LifecycleError::InvalidStateTransition {
                from: current,
                to: target,
            });
        }

        let paid_at = (target == PaymentStatus::Approved).then(Utc::now);
        let updated = self
            .store
            .update_status_if(
                payment.id,
                &[current.to_db_status()],
                target.to_db_status(),
                paid_at,
            )
            .await?;

        match updated {
            Some(updated) => {
                info!(
                    payment_id = %updated.id,
                    from = %current,
                    to = %target,
                    "payment transitioned via webhook"
                );
                Ok(WebhookOutcome::Transitioned(updated))
            }
            None => {
                // Lost a race with another writer; re-read to tell a
                // concurrent replay apart from a genuine conflict.
                let refreshed = self.store.find_by_id(payment.id).await?.ok_or(
                    LifecycleError::PaymentNotFound {
                        reference: payment.id.to_string(),
                    },
                )?;
                let now = PaymentStatus::from_db_status(&refreshed.status).ok_or(
                    LifecycleError::UnknownStoredStatus {
                        status: refreshed.status.clone(),
                    },
                )?;
                if now == target {
                    Ok(WebhookOutcome::AlreadyApplied(refreshed))
                } else {
                    Err(LifecycleError::InvalidStateTransition {
                        from: now,
                        to: target,
                    })
                }
            }
        }
    }

    /// Manually cancel a payment that has not been confirmed yet.
    pub async fn cancel_payment(&self, payment_id: Uuid) -> LifecycleResult<Payment> {
        self.manual_transition(
            payment_id,
            &[PaymentStatus::Pending, PaymentStatus::Initialized],
            PaymentStatus::Canceled,
        )
        .await
    }

    /// Refund an approved payment.
    pub async fn refund_payment(&self, payment_id: Uuid) -> LifecycleResult<Payment> {
        self.manual_transition(payment_id, &[PaymentStatus::Approved], PaymentStatus::Refunded)
            .await
    }

    async fn manual_transition(
        &self,
        payment_id: Uuid,
        allowed_from: &[PaymentStatus],
        target: PaymentStatus,
    ) -> LifecycleResult<Payment> {
        let from_statuses: Vec<&'static str> =
            allowed_from.iter().map(|s| s.to_db_status()).collect();

        let updated = self
            .store
            .update_status_if(payment_id, &from_statuses, target.to_db_status(), None)
            .await?;

        match updated {
            Some(payment) => {
                info!(payment_id = %payment.id, to = %target, "payment transitioned manually");
                Ok(payment)
            }
            None => {
                let payment = self.store.find_by_id(payment_id).await?.ok_or(
                    LifecycleError::PaymentNotFound {
                        reference: payment_id.to_string(),
                    },
                )?;
                let current = PaymentStatus::from_db_status(&payment.status).ok_or(
                    LifecycleError::UnknownStoredStatus {
                        status: payment.status.clone(),
                    },
                )?;
                Err(LifecycleError::InvalidStateTransition {
                    from: current,
                    to: target,
                })
            }
        }
    }

    /// Expire every PIX payment whose window elapsed without confirmation.
    /// One bulk conditional update; rows that got approved or canceled in
    /// the meantime are filtered out by the store.
    pub async fn expire_stale_pix_payments(&self, now: DateTime<Utc>) -> LifecycleResult<u64> {
        let expired = self.store.expire_stale_pix(now).await?;
        if expired > 0 {
            info!(count = expired, "expired stale pix payments");
        }
        Ok(expired)
    }
}

/// Map a processor-reported status onto the lifecycle vocabulary.
/// `None` means the event carries no state change worth applying.
fn webhook_target_status(status: GatewayTransactionStatus) -> Option<PaymentStatus> {
    match status {
        GatewayTransactionStatus::Approved => Some(PaymentStatus::Approved),
        GatewayTransactionStatus::Declined => Some(PaymentStatus::Declined),
        GatewayTransactionStatus::Failed => Some(PaymentStatus::Failed),
        GatewayTransactionStatus::Expired => Some(PaymentStatus::Expired),
        GatewayTransactionStatus::Canceled => Some(PaymentStatus::Canceled),
        GatewayTransactionStatus::Refunded => Some(PaymentStatus::Refunded),
        GatewayTransactionStatus::Pending | GatewayTransactionStatus::Unknown => None,
    }
}

/// Platform cut in centavos, rounded down.
fn platform_fee(amount: i64, bps: u32) -> i64 {
    amount * i64::from(bps) / 10_000
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codes::{CodeGenerator, FixedWorkerId};
    use crate::database::memory::InMemoryPaymentStore;
    use crate::gateways::error::{GatewayError, GatewayResult};
    use crate::gateways::types::{
        GatewayKind, PaymentDetails, PixTransaction, WebhookEvent,
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Scripted gateway double that counts charge attempts.
    struct ScriptedGateway {
        calls: AtomicU32,
        fail_with: Option<GatewayError>,
        report_expiry: Option<DateTime<Utc>>,
    }

    impl ScriptedGateway {
        fn accepting() -> Self {
            Self {
                calls: AtomicU32::new(0),
                fail_with: None,
                report_expiry: None,
            }
        }

        fn failing(error: GatewayError) -> Self {
            Self {
                calls: AtomicU32::new(0),
                fail_with: Some(error),
                report_expiry: None,
            }
        }

        fn call_count(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PaymentGateway for ScriptedGateway {
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
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(error) = &self.fail_with {
                return Err(error.clone());
            }
            Ok(PixTransaction {
                id: format!("tx-{}", data.reference),
                status: GatewayTransactionStatus::Pending,
                amount: data.amount,
                pix_code: Some("00020126...".to_string()),
                pix_qr_code: Some("iVBORw0KGgo=".to_string()),
                expires_at: self.report_expiry,
                metadata: serde_json::json!({}),
            })
        }

        async fn get_payment_details(&self, transaction_id: &str) -> GatewayResult<PaymentDetails> {
            Err(GatewayError::MalformedResponse {
                message: format!("not scripted for {}", transaction_id),
            })
        }

        fn validate_webhook(&self, _payload: &[u8], _signature: Option<&str>) -> bool {
            true
        }

        fn parse_webhook_event(&self, _payload: &[u8]) -> GatewayResult<WebhookEvent> {
            Err(GatewayError::MalformedResponse {
                message: "not scripted".to_string(),
            })
        }
    }

    fn lifecycle() -> (PaymentLifecycle, Arc<InMemoryPaymentStore>) {
        let store = Arc::new(InMemoryPaymentStore::new());
        let codes = Arc::new(CodeGenerator::new("test-signing-secret", &FixedWorkerId(7)));
        let service = PaymentLifecycle::new(
            store.clone(),
            codes,
            LifecycleConfig {
                platform_fee_bps: 500,
                ..LifecycleConfig::default()
            },
        );
        (service, store)
    }

    fn request(idempotency_key: Option<&str>) -> CreatePaymentRequest {
        CreatePaymentRequest {
            tenant_id: Uuid::nil(),
            campaign_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            amount: 2000,
            tax_seller: 40,
            customer: CustomerInfo {
                name: "Ana Costa".to_string(),
                email: "ana@example.com".to_string(),
                document: "111.444.777-35".to_string(),
                phone: None,
            },
            items: vec![LineItem {
                description: "10 numeros".to_string(),
                quantity: 10,
                unit_amount: 200,
            }],
            idempotency_key: idempotency_key.map(str::to_string),
            postback_url: None,
        }
    }

    // ------------------------------------------------------------------
    // State machine
    // ------------------------------------------------------------------

    #[test]
    fn test_state_transitions_valid() {
        assert!(PaymentStatus::Pending.can_transition_to(PaymentStatus::Initialized));
        assert!(PaymentStatus::Initialized.can_transition_to(PaymentStatus::Approved));
        assert!(PaymentStatus::Initialized.can_transition_to(PaymentStatus::Declined));
        assert!(PaymentStatus::Pending.can_transition_to(PaymentStatus::Canceled));
        assert!(PaymentStatus::Initialized.can_transition_to(PaymentStatus::Expired));
        assert!(PaymentStatus::Approved.can_transition_to(PaymentStatus::Refunded));
    }

    #[test]
    fn test_state_transitions_invalid() {
        assert!(!PaymentStatus::Pending.can_transition_to(PaymentStatus::Approved));
        assert!(!PaymentStatus::Approved.can_transition_to(PaymentStatus::Canceled));
        assert!(!PaymentStatus::Approved.can_transition_to(PaymentStatus::Expired));
        assert!(PaymentStatus::Refunded.valid_transitions().is_empty());
        assert!(PaymentStatus::Expired.valid_transitions().is_empty());
    }

    #[test]
    fn test_terminal_states() {
        for status in [
            PaymentStatus::Declined,
            PaymentStatus::Failed,
            PaymentStatus::Expired,
            PaymentStatus::Canceled,
            PaymentStatus::Refunded,
        ] {
            assert!(status.is_terminal(), "{status} should be terminal");
        }
        assert!(!PaymentStatus::Pending.is_terminal());
        assert!(!PaymentStatus::Initialized.is_terminal());
        assert!(!PaymentStatus::Approved.is_terminal());
    }

    #[test]
    fn test_db_status_round_trip() {
        for status in [
            PaymentStatus::Pending,
            PaymentStatus::Initialized,
            PaymentStatus::Approved,
            PaymentStatus::Declined,
            PaymentStatus::Failed,
            PaymentStatus::Expired,
            PaymentStatus::Canceled,
            PaymentStatus::Refunded,
        ] {
            assert_eq!(PaymentStatus::from_db_status(status.to_db_status()), Some(status));
        }
        assert_eq!(PaymentStatus::from_db_status("???"), None);
    }

    #[test]
    fn test_platform_fee_rounds_down() {
        assert_eq!(platform_fee(2000, 500), 100);
        assert_eq!(platform_fee(999, 500), 49);
        assert_eq!(platform_fee(2000, 0), 0);
    }

    // ------------------------------------------------------------------
    // Creation
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn create_initializes_payment_with_code_and_fee_split() {
        let (service, _store) = lifecycle();
        let gateway = ScriptedGateway::accepting();

        let payment = service
            .create_payment(&gateway, None, request(None))
            .await
            .expect("create should succeed");

        assert_eq!(payment.status, "initialized");
        assert!(payment.payment_code.starts_with("PAY-"));
        assert_eq!(payment.amount, 2000);
        assert_eq!(payment.tax_platform, 100); // 5% of 2000
        assert_eq!(payment.tax_seller, 40);
        assert_eq!(payment.amount_received, 1860);
        assert!(payment.processor_transaction_id.is_some());
        assert!(payment.pix_code.is_some());
        assert_eq!(gateway.call_count(), 1);
    }

    #[tokio::test]
    async fn pix_expiry_is_exactly_the_configured_window_after_purchase() {
        let (service, _store) = lifecycle();
        let gateway = ScriptedGateway::accepting();

        let payment = service
            .create_payment(&gateway, None, request(None))
            .await
            .expect("create should succeed");

        let expires_at = payment.expires_at.expect("pix payment must carry expiry");
        assert_eq!(expires_at, payment.purchase_at + Duration::minutes(10));
    }

    #[tokio::test]
    async fn processor_reported_expiry_lands_in_metadata_only() {
        let (service, store) = lifecycle();
        let processor_deadline = Utc::now() + Duration::minutes(30);
        let gateway = ScriptedGateway {
            calls: AtomicU32::new(0),
            fail_with: None,
            report_expiry: Some(processor_deadline),
        };

        let payment = service
            .create_payment(&gateway, None, request(None))
            .await
            .expect("create should succeed");

        // The local window stays authoritative even when the processor
        // reports a longer one.
        assert_eq!(
            payment.expires_at,
            Some(payment.purchase_at + Duration::minutes(10))
        );

        let stored = store
            .find_by_id(payment.id)
            .await
            .expect("lookup should succeed")
            .expect("row should exist");
        assert!(stored.metadata.get("processor_expires_at").is_some());
    }

    #[tokio::test]
    async fn duplicate_idempotency_key_returns_existing_without_new_charge() {
        let (service, _store) = lifecycle();
        let gateway = ScriptedGateway::accepting();

        let first = service
            .create_payment(&gateway, None, request(Some("order-77")))
            .await
            .expect("first create should succeed");
        let second = service
            .create_payment(&gateway, None, request(Some("order-77")))
            .await
            .expect("replayed create should succeed");

        assert_eq!(first.id, second.id);
        assert_eq!(gateway.call_count(), 1);
    }

    #[tokio::test]
    async fn gateway_rejection_marks_payment_failed() {
        let (service, store) = lifecycle();
        let gateway = ScriptedGateway::failing(GatewayError::CommunicationError {
            gateway: "suitpay".to_string(),
            status_code: 422,
            body: "document rejected".to_string(),
            retryable: false,
        });

        let err = service
            .create_payment(&gateway, None, request(Some("order-80")))
            .await
            .expect_err("gateway rejection should propagate");
        assert!(matches!(err, LifecycleError::Gateway(_)));

        let stored = store
            .find_by_idempotency_key(Uuid::nil(), "order-80")
            .await
            .expect("lookup should succeed")
            .expect("row should exist");
        assert_eq!(stored.status, "failed");
    }

    #[tokio::test]
    async fn non_positive_amount_is_rejected_before_any_work() {
        let (service, _store) = lifecycle();
        let gateway = ScriptedGateway::accepting();

        let mut bad = request(None);
        bad.amount = 0;
        let err = service
            .create_payment(&gateway, None, bad)
            .await
            .expect_err("zero amount must fail");
        assert!(matches!(err, LifecycleError::InvalidAmount { .. }));
        assert_eq!(gateway.call_count(), 0);
    }

    // ------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn lookup_rejects_tampered_codes_without_touching_the_store() {
        let (service, _store) = lifecycle();
        let gateway = ScriptedGateway::accepting();

        let payment = service
            .create_payment(&gateway, None, request(None))
            .await
            .expect("create should succeed");

        let found = service
            .get_payment(&payment.payment_code)
            .await
            .expect("valid code should resolve");
        assert_eq!(found.id, payment.id);

        let err = service
            .get_payment("PAY-NOT-A-REAL-CODE")
            .await
            .expect_err("malformed code must fail validation");
        assert!(matches!(err, LifecycleError::InvalidPaymentCode { .. }));
    }

    // ------------------------------------------------------------------
    // Webhooks
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn webhook_approval_sets_paid_at_once() {
        let (service, _store) = lifecycle();
        let gateway = ScriptedGateway::accepting();

        let payment = service
            .create_payment(&gateway, None, request(None))
            .await
            .expect("create should succeed");
        let tx_id = payment
            .processor_transaction_id
            .clone()
            .expect("initialized payment has processor id");

        let outcome = service
            .apply_webhook_event(Uuid::nil(), &tx_id, GatewayTransactionStatus::Approved)
            .await
            .expect("approval should apply");
        let approved = match outcome {
            WebhookOutcome::Transitioned(p) => p,
            other => panic!("expected transition, got {:?}", other),
        };
        assert_eq!(approved.status, "approved");
        let paid_at = approved.paid_at.expect("approval records paid_at");

        // Replay of the same event changes nothing.
        let replay = service
            .apply_webhook_event(Uuid::nil(), &tx_id, GatewayTransactionStatus::Approved)
            .await
            .expect("replay should be accepted");
        let replayed = match replay {
            WebhookOutcome::AlreadyApplied(p) => p,
            other => panic!("expected replay no-op, got {:?}", other),
        };
        assert_eq!(replayed.paid_at, Some(paid_at));
        assert_eq!(replayed.amount_received, approved.amount_received);
    }

    #[tokio::test]
    async fn webhook_cannot_move_terminal_payment() {
        let (service, _store) = lifecycle();
        let gateway = ScriptedGateway::accepting();

        let payment = service
            .create_payment(&gateway, None, request(None))
            .await
            .expect("create should succeed");
        let tx_id = payment
            .processor_transaction_id
            .clone()
            .expect("initialized payment has processor id");

        service
            .apply_webhook_event(Uuid::nil(), &tx_id, GatewayTransactionStatus::Declined)
            .await
            .expect("decline should apply");

        let err = service
            .apply_webhook_event(Uuid::nil(), &tx_id, GatewayTransactionStatus::Approved)
            .await
            .expect_err("approval after decline is a conflict");
        assert!(matches!(
            err,
            LifecycleError::InvalidStateTransition {
                from: PaymentStatus::Declined,
                to: PaymentStatus::Approved,
            }
        ));
    }

    #[tokio::test]
    async fn webhook_with_pending_status_is_ignored() {
        let (service, _store) = lifecycle();
        let gateway = ScriptedGateway::accepting();

        let payment = service
            .create_payment(&gateway, None, request(None))
            .await
            .expect("create should succeed");
        let tx_id = payment
            .processor_transaction_id
            .clone()
            .expect("initialized payment has processor id");

        let outcome = service
            .apply_webhook_event(Uuid::nil(), &tx_id, GatewayTransactionStatus::Pending)
            .await
            .expect("pending event should be accepted");
        assert!(matches!(outcome, WebhookOutcome::Ignored(_)));
    }

    #[tokio::test]
    async fn webhook_for_unknown_transaction_is_not_found() {
        let (service, _store) = lifecycle();

        let err = service
            .apply_webhook_event(Uuid::nil(), "tx-nowhere", GatewayTransactionStatus::Approved)
            .await
            .expect_err("unknown transaction must fail");
        assert!(matches!(err, LifecycleError::PaymentNotFound { .. }));
    }

    // ------------------------------------------------------------------
    // Manual edges & expiration
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn cancel_and_refund_respect_the_state_machine() {
        let (service, _store) = lifecycle();
        let gateway = ScriptedGateway::accepting();

        let payment = service
            .create_payment(&gateway, None, request(None))
            .await
            .expect("create should succeed");

        let canceled = service
            .cancel_payment(payment.id)
            .await
            .expect("initialized payment can be canceled");
        assert_eq!(canceled.status, "canceled");

        let err = service
            .refund_payment(payment.id)
            .await
            .expect_err("canceled payment cannot be refunded");
        assert!(matches!(err, LifecycleError::InvalidStateTransition { .. }));
    }

    #[tokio::test]
    async fn refund_only_applies_to_approved_payments() {
        let (service, _store) = lifecycle();
        let gateway = ScriptedGateway::accepting();

        let payment = service
            .create_payment(&gateway, None, request(None))
            .await
            .expect("create should succeed");
        let tx_id = payment
            .processor_transaction_id
            .clone()
            .expect("initialized payment has processor id");
        service
            .apply_webhook_event(Uuid::nil(), &tx_id, GatewayTransactionStatus::Approved)
            .await
            .expect("approval should apply");

        let refunded = service
            .refund_payment(payment.id)
            .await
            .expect("approved payment can be refunded");
        assert_eq!(refunded.status, "refunded");
    }

    #[tokio::test]
    async fn sweep_expires_overdue_but_never_approved() {
        let (service, _store) = lifecycle();
        let gateway = ScriptedGateway::accepting();

        let stale = service
            .create_payment(&gateway, None, request(None))
            .await
            .expect("create should succeed");
        let paid = service
            .create_payment(&gateway, None, request(None))
            .await
            .expect("create should succeed");
        let paid_tx = paid
            .processor_transaction_id
            .clone()
            .expect("initialized payment has processor id");
        service
            .apply_webhook_event(Uuid::nil(), &paid_tx, GatewayTransactionStatus::Approved)
            .await
            .expect("approval should apply");

        // Both windows have elapsed from the sweep's point of view.
        let later = Utc::now() + Duration::minutes(11);
        let count = service
            .expire_stale_pix_payments(later)
            .await
            .expect("sweep should succeed");
        assert_eq!(count, 1);

        let stale = service
            .get_payment(&stale.payment_code)
            .await
            .expect("lookup should succeed");
        assert_eq!(stale.status, "expired");

        let paid = service
            .get_payment(&paid.payment_code)
            .await
            .expect("lookup should succeed");
        assert_eq!(paid.status, "approved");
    }
}
