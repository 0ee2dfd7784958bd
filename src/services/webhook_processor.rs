//! Webhook Processing Service
//!
//! Orchestrates inbound processor notifications: identify the sending
//! gateway by signature, parse the body through that adapter, then apply
//! the event to the payment state machine. Screened-out or non-actionable
//! deliveries are logged and dropped so the HTTP layer can keep answering
//! with a neutral 200 and never leak which gateways a tenant runs.

use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{AppResult, ErrorCode};
use crate::gateways::manager::GatewayManager;
use crate::services::payment_lifecycle::{LifecycleError, PaymentLifecycle, WebhookOutcome};

/// What became of one webhook delivery.
///
/// Only infrastructure failures surface as errors from
/// [`WebhookProcessor::process`]; everything here answers 200 externally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookDisposition {
    /// The referenced payment moved to a new state.
    Applied { payment_id: Uuid, status: String },
    /// Replay of an event that was already applied; nothing changed.
    Duplicate { payment_id: Uuid },
    /// Logged and dropped without touching any payment.
    Dropped { reason: DropReason },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// No active gateway of the tenant accepts the signature.
    InvalidSignature,
    /// The tenant has no active gateway configuration at all.
    NoGatewayConfigured,
    /// The identified adapter could not parse the body.
    UnparseablePayload,
    /// The event references a transaction we never recorded.
    UnknownTransaction,
    /// The event demands a transition the state machine forbids.
    StateConflict,
    /// The event carries no actionable status (still pending, unknown).
    NotActionable,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::InvalidSignature => "invalid_signature",
            DropReason::NoGatewayConfigured => "no_gateway_configured",
            DropReason::UnparseablePayload => "unparseable_payload",
            DropReason::UnknownTransaction => "unknown_transaction",
            DropReason::StateConflict => "state_conflict",
            DropReason::NotActionable => "not_actionable",
        }
    }
}

pub struct WebhookProcessor {
    manager: Arc<GatewayManager>,
    lifecycle: Arc<PaymentLifecycle>,
}

impl WebhookProcessor {
    pub fn new(manager: Arc<GatewayManager>, lifecycle: Arc<PaymentLifecycle>) -> Self {
        Self { manager, lifecycle }
    }

    /// Run one delivery through identification, parsing and application.
    ///
    /// `Err` is reserved for infrastructure failures (store or vault
    /// outages) where a processor redelivery can succeed later. Every
    /// screening or domain outcome is a [`WebhookDisposition`].
    pub async fn process(
        &self,
        tenant_id: Uuid,
        payload: &[u8],
        signature: Option<&str>,
    ) -> AppResult<WebhookDisposition> {
        let resolved = match self
            .manager
            .identify_webhook_sender(tenant_id, payload, signature)
            .await
        {
            Ok(resolved) => resolved,
            Err(err) => {
                let reason = match err.error_code() {
                    ErrorCode::InvalidWebhookSignature => DropReason::InvalidSignature,
                    ErrorCode::NoGatewayConfigured => DropReason::NoGatewayConfigured,
                    _ => return Err(err),
                };
                warn!(
                    %tenant_id,
                    reason = reason.as_str(),
                    "dropping webhook that failed signature screening"
                );
                return Ok(WebhookDisposition::Dropped { reason });
            }
        };

        let gateway_kind = resolved.adapter.kind();
        let event = match resolved.adapter.parse_webhook_event(payload) {
            Ok(event) => event,
            Err(err) => {
                warn!(
                    %tenant_id,
                    gateway = %gateway_kind,
                    error = %err,
                    "dropping webhook the adapter could not parse"
                );
                return Ok(WebhookDisposition::Dropped {
                    reason: DropReason::UnparseablePayload,
                });
            }
        };

        info!(
            %tenant_id,
            gateway = %gateway_kind,
            event_type = %event.event_type,
            processor_transaction_id = %event.processor_transaction_id,
            "webhook identified and parsed"
        );

        let outcome = self
            .lifecycle
            .apply_webhook_event(tenant_id, &event.processor_transaction_id, event.status)
            .await;

        match outcome {
            Ok(WebhookOutcome::Transitioned(payment)) => {
                info!(
                    %tenant_id,
                    payment_id = %payment.id,
                    status = %payment.status,
                    "webhook applied"
                );
                Ok(WebhookDisposition::Applied {
                    payment_id: payment.id,
                    status: payment.status.clone(),
                })
            }
            Ok(WebhookOutcome::AlreadyApplied(payment)) => {
                info!(
                    %tenant_id,
                    payment_id = %payment.id,
                    "webhook replay, already applied"
                );
                Ok(WebhookDisposition::Duplicate {
                    payment_id: payment.id,
                })
            }
            Ok(WebhookOutcome::Ignored(payment)) => {
                info!(
                    %tenant_id,
                    payment_id = %payment.id,
                    event_type = %event.event_type,
                    "webhook carries no actionable status"
                );
                Ok(WebhookDisposition::Dropped {
                    reason: DropReason::NotActionable,
                })
            }
            Err(LifecycleError::PaymentNotFound { reference }) => {
                warn!(
                    %tenant_id,
                    gateway = %gateway_kind,
                    processor_transaction_id = %reference,
                    "webhook references an unknown transaction"
                );
                Ok(WebhookDisposition::Dropped {
                    reason: DropReason::UnknownTransaction,
                })
            }
            Err(LifecycleError::InvalidStateTransition { from, to }) => {
                warn!(
                    %tenant_id,
                    gateway = %gateway_kind,
                    %from,
                    %to,
                    "webhook demands a forbidden transition"
                );
                Ok(WebhookDisposition::Dropped {
                    reason: DropReason::StateConflict,
                })
            }
            Err(err) => Err(err.into()),
        }
    }
}
