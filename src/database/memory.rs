//! In-memory store implementations.
//!
//! Used by the test suite and by local development when no database is
//! reachable. They enforce the same uniqueness and conditional-update
//! semantics as the Postgres stores.

use crate::database::error::{DatabaseError, DatabaseErrorKind};
use crate::database::gateway_config_store::{GatewayConfig, GatewayConfigStore};
use crate::database::payment_store::{InitializationDetails, NewPayment, Payment, PaymentStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Default)]
pub struct InMemoryPaymentStore {
    rows: Mutex<HashMap<Uuid, Payment>>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn rows(&self) -> MutexGuard<'_, HashMap<Uuid, Payment>> {
        match self.rows.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn merge_metadata(target: &mut JsonValue, patch: &JsonValue) {
    // Mirrors JSONB `||`: a shallow object merge, otherwise replacement.
    match (target.as_object_mut(), patch.as_object()) {
        (Some(existing), Some(incoming)) => {
            for (key, value) in incoming {
                existing.insert(key.clone(), value.clone());
            }
        }
        _ => *target = patch.clone(),
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn insert(&self, new_payment: NewPayment) -> Result<Payment, DatabaseError> {
        let mut rows = self.rows();

        if rows
            .values()
            .any(|p| p.payment_code == new_payment.payment_code)
        {
            return Err(DatabaseError::new(DatabaseErrorKind::UniqueViolation {
                constraint: "payments_payment_code_key".to_string(),
            }));
        }
        if let Some(key) = &new_payment.idempotency_key {
            if rows.values().any(|p| {
                p.tenant_id == new_payment.tenant_id && p.idempotency_key.as_deref() == Some(key)
            }) {
                return Err(DatabaseError::new(DatabaseErrorKind::UniqueViolation {
                    constraint: "payments_tenant_idempotency_key_key".to_string(),
                }));
            }
        }

        let now = Utc::now();
        let payment = Payment {
            id: Uuid::new_v4(),
            tenant_id: new_payment.tenant_id,
            campaign_id: new_payment.campaign_id,
            user_id: new_payment.user_id,
            payment_code: new_payment.payment_code,
            idempotency_key: new_payment.idempotency_key,
            gateway_kind: new_payment.gateway_kind,
            gateway_config_id: new_payment.gateway_config_id,
            processor_transaction_id: None,
            method: new_payment.method,
            status: new_payment.status,
            amount: new_payment.amount,
            tax_platform: new_payment.tax_platform,
            tax_seller: new_payment.tax_seller,
            amount_received: new_payment.amount_received,
            pix_code: None,
            pix_qr_code: None,
            purchase_at: new_payment.purchase_at,
            expires_at: new_payment.expires_at,
            paid_at: None,
            metadata: new_payment.metadata,
            created_at: now,
            updated_at: now,
        };
        rows.insert(payment.id, payment.clone());
        Ok(payment)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Payment>, DatabaseError> {
        Ok(self.rows().get(&id).cloned())
    }

    async fn find_by_payment_code(
        &self,
        payment_code: &str,
    ) -> Result<Option<Payment>, DatabaseError> {
        Ok(self
            .rows()
            .values()
            .find(|p| p.payment_code == payment_code)
            .cloned())
    }

    async fn find_by_idempotency_key(
        &self,
        tenant_id: Uuid,
        idempotency_key: &str,
    ) -> Result<Option<Payment>, DatabaseError> {
        Ok(self
            .rows()
            .values()
            .find(|p| {
                p.tenant_id == tenant_id && p.idempotency_key.as_deref() == Some(idempotency_key)
            })
            .cloned())
    }

    async fn find_by_processor_transaction_id(
        &self,
        tenant_id: Uuid,
        processor_transaction_id: &str,
    ) -> Result<Option<Payment>, DatabaseError> {
        Ok(self
            .rows()
            .values()
            .find(|p| {
                p.tenant_id == tenant_id
                    && p.processor_transaction_id.as_deref() == Some(processor_transaction_id)
            })
            .cloned())
    }

    async fn mark_initialized(
        &self,
        id: Uuid,
        details: InitializationDetails,
    ) -> Result<Option<Payment>, DatabaseError> {
        let mut rows = self.rows();
        let Some(payment) = rows.get_mut(&id) else {
            return Ok(None);
        };
        if payment.status != "pending" {
            return Ok(None);
        }

        payment.status = "initialized".to_string();
        payment.processor_transaction_id = Some(details.processor_transaction_id);
        payment.pix_code = details.pix_code;
        payment.pix_qr_code = details.pix_qr_code;
        payment.updated_at = Utc::now();
        Ok(Some(payment.clone()))
    }

    async fn update_status_if(
        &self,
        id: Uuid,
        allowed_from: &[&str],
        to: &str,
        paid_at: Option<DateTime<Utc>>,
    ) -> Result<Option<Payment>, DatabaseError> {
        let mut rows = self.rows();
        let Some(payment) = rows.get_mut(&id) else {
            return Ok(None);
        };
        if !allowed_from.contains(&payment.status.as_str()) {
            return Ok(None);
        }

        payment.status = to.to_string();
        if paid_at.is_some() {
            payment.paid_at = paid_at;
        }
        payment.updated_at = Utc::now();
        Ok(Some(payment.clone()))
    }

    async fn append_metadata(&self, id: Uuid, patch: &JsonValue) -> Result<(), DatabaseError> {
        let mut rows = self.rows();
        if let Some(payment) = rows.get_mut(&id) {
            merge_metadata(&mut payment.metadata, patch);
            payment.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn expire_stale_pix(&self, now: DateTime<Utc>) -> Result<u64, DatabaseError> {
        let mut rows = self.rows();
        let mut expired = 0u64;
        for payment in rows.values_mut() {
            let overdue = payment.method == "pix"
                && matches!(payment.status.as_str(), "pending" | "initialized")
                && payment.expires_at.is_some_and(|at| at <= now);
            if overdue {
                payment.status = "expired".to_string();
                payment.updated_at = Utc::now();
                expired += 1;
            }
        }
        Ok(expired)
    }
}

#[derive(Default)]
pub struct InMemoryGatewayConfigStore {
    rows: Mutex<Vec<GatewayConfig>>,
}

impl InMemoryGatewayConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, config: GatewayConfig) {
        let mut rows = match self.rows.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        rows.push(config);
    }

    fn snapshot(&self) -> Vec<GatewayConfig> {
        let rows = match self.rows.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        rows.clone()
    }
}

#[async_trait]
impl GatewayConfigStore for InMemoryGatewayConfigStore {
    async fn find_active_default(
        &self,
        tenant_id: Uuid,
    ) -> Result<Option<GatewayConfig>, DatabaseError> {
        Ok(self
            .snapshot()
            .into_iter()
            .find(|c| c.tenant_id == tenant_id && c.is_active && c.is_default))
    }

    async fn find_active_by_id(
        &self,
        tenant_id: Uuid,
        config_id: Uuid,
    ) -> Result<Option<GatewayConfig>, DatabaseError> {
        Ok(self
            .snapshot()
            .into_iter()
            .find(|c| c.id == config_id && c.tenant_id == tenant_id && c.is_active))
    }

    async fn find_active_for_tenant(
        &self,
        tenant_id: Uuid,
    ) -> Result<Vec<GatewayConfig>, DatabaseError> {
        let mut configs: Vec<GatewayConfig> = self
            .snapshot()
            .into_iter()
            .filter(|c| c.tenant_id == tenant_id && c.is_active)
            .collect();
        configs.sort_by_key(|c| (!c.is_default, c.created_at));
        Ok(configs)
    }
}
