use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::services::payment_lifecycle::PaymentLifecycle;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PaymentExpirationConfig {
    /// How often the worker wakes up to sweep overdue PIX charges.
    pub poll_interval: Duration,
}

impl Default for PaymentExpirationConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
        }
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

/// Periodically expires PIX payments whose window elapsed unpaid.
///
/// The sweep itself is one conditional bulk update in the store, so a
/// webhook approving a payment between cycles always wins; the worker only
/// reports counts and never propagates a failure out of its loop.
pub struct PaymentExpirationWorker {
    lifecycle: Arc<PaymentLifecycle>,
    config: PaymentExpirationConfig,
}

impl PaymentExpirationWorker {
    pub fn new(lifecycle: Arc<PaymentLifecycle>, config: PaymentExpirationConfig) -> Self {
        Self { lifecycle, config }
    }

    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            "payment expiration worker started"
        );

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("payment expiration worker stopping");
                        break;
                    }
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {
                    self.run_cycle().await;
                }
            }
        }

        info!("payment expiration worker stopped");
    }

    async fn run_cycle(&self) {
        match self
            .lifecycle
            .expire_stale_pix_payments(chrono::Utc::now())
            .await
        {
            Ok(0) => {}
            Ok(count) => {
                info!(expired = count, "expiration sweep finished");
            }
            Err(e) => {
                warn!(error = %e, "expiration sweep failed");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codes::{CodeGenerator, FixedWorkerId};
    use crate::database::memory::InMemoryPaymentStore;
    use crate::database::payment_store::{NewPayment, PaymentStore};
    use crate::services::payment_lifecycle::LifecycleConfig;
    use chrono::{Duration as ChronoDuration, Utc};
    use uuid::Uuid;

    fn worker_with_store() -> (PaymentExpirationWorker, Arc<InMemoryPaymentStore>) {
        let store = Arc::new(InMemoryPaymentStore::new());
        let codes = Arc::new(CodeGenerator::new("test-signing-secret", &FixedWorkerId(9)));
        let lifecycle = Arc::new(PaymentLifecycle::new(
            store.clone(),
            codes,
            LifecycleConfig::default(),
        ));
        (
            PaymentExpirationWorker::new(lifecycle, PaymentExpirationConfig::default()),
            store,
        )
    }

    fn overdue_pix_row(status: &str) -> NewPayment {
        let purchase_at = Utc::now() - ChronoDuration::minutes(30);
        NewPayment {
            tenant_id: Uuid::nil(),
            campaign_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            payment_code: format!("PAY-{}", Uuid::new_v4()),
            idempotency_key: None,
            gateway_kind: "suitpay".to_string(),
            gateway_config_id: None,
            method: "pix".to_string(),
            status: status.to_string(),
            amount: 1000,
            tax_platform: 0,
            tax_seller: 0,
            amount_received: 1000,
            purchase_at,
            expires_at: Some(purchase_at + ChronoDuration::minutes(10)),
            metadata: serde_json::json!({}),
        }
    }

    #[test]
    fn default_poll_interval_is_thirty_seconds() {
        let cfg = PaymentExpirationConfig::default();
        assert_eq!(cfg.poll_interval, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn cycle_expires_overdue_waiting_rows_only() {
        let (worker, store) = worker_with_store();

        let waiting = store
            .insert(overdue_pix_row("initialized"))
            .await
            .expect("insert should succeed");
        let approved = store
            .insert(overdue_pix_row("approved"))
            .await
            .expect("insert should succeed");

        worker.run_cycle().await;

        let waiting = store
            .find_by_id(waiting.id)
            .await
            .expect("lookup should succeed")
            .expect("row exists");
        assert_eq!(waiting.status, "expired");

        let approved = store
            .find_by_id(approved.id)
            .await
            .expect("lookup should succeed")
            .expect("row exists");
        assert_eq!(approved.status, "approved");
    }
}
