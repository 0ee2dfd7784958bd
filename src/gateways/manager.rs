use crate::database::gateway_config_store::{GatewayConfig, GatewayConfigStore};
use crate::error::{AppError, AppResult};
use crate::gateways::error::GatewayError;
use crate::gateways::factory::GatewayFactory;
use crate::gateways::gateway::PaymentGateway;
use crate::gateways::types::{CreateTransactionData, PixTransaction};
use crate::gateways::vault::CredentialVault;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// A gateway adapter together with the stored configuration it was
/// built from.
pub struct ResolvedGateway {
    pub config: GatewayConfig,
    pub adapter: Box<dyn PaymentGateway>,
}

impl std::fmt::Debug for ResolvedGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedGateway")
            .field("config", &self.config)
            .field("adapter", &self.adapter.kind())
            .finish()
    }
}

/// Resolves tenant gateway configurations into live adapters.
///
/// Configurations hold encrypted credential bundles; the manager asks the
/// vault to decrypt them and hands the result to the factory. Inactive
/// configurations are invisible at this layer.
pub struct GatewayManager {
    configs: Arc<dyn GatewayConfigStore>,
    vault: Arc<dyn CredentialVault>,
}

impl GatewayManager {
    pub fn new(configs: Arc<dyn GatewayConfigStore>, vault: Arc<dyn CredentialVault>) -> Self {
        Self { configs, vault }
    }

    async fn resolve(&self, config: GatewayConfig) -> AppResult<ResolvedGateway> {
        let credentials = self.vault.decrypt(&config.credentials_bundle).await?;
        let settings = config.parsed_settings();
        let adapter =
            GatewayFactory::build_from_name(&config.gateway_kind, &credentials, &settings)?;
        Ok(ResolvedGateway { config, adapter })
    }

    /// Tenant's default gateway, ready to charge through.
    pub async fn default_gateway(&self, tenant_id: Uuid) -> AppResult<ResolvedGateway> {
        let config = self
            .configs
            .find_active_default(tenant_id)
            .await?
            .ok_or_else(|| no_gateway(tenant_id))?;
        self.resolve(config).await
    }

    /// A specific gateway configuration, if it exists, belongs to the
    /// tenant, and is active.
    pub async fn gateway_by_id(&self, tenant_id: Uuid, config_id: Uuid) -> AppResult<ResolvedGateway> {
        let config = self
            .configs
            .find_active_by_id(tenant_id, config_id)
            .await?
            .ok_or_else(|| no_gateway(tenant_id))?;
        self.resolve(config).await
    }

    /// Charge through the tenant's default gateway.
    ///
    /// Convenience for callers that do not need the configuration row;
    /// the payment API resolves first so it can persist which
    /// configuration handled the charge.
    pub async fn create_pix_transaction(
        &self,
        tenant_id: Uuid,
        data: &CreateTransactionData,
    ) -> AppResult<PixTransaction> {
        let resolved = self.default_gateway(tenant_id).await?;
        let transaction = resolved.adapter.create_pix_transaction(data.clone()).await?;
        Ok(transaction)
    }

    /// Find which of the tenant's active gateways signed a webhook.
    ///
    /// Deliveries do not identify the configuration that produced them,
    /// so every active adapter is asked to validate the signature until
    /// one accepts. A configuration that fails to resolve is skipped so
    /// it cannot block deliveries for the tenant's other processors.
    pub async fn identify_webhook_sender(
        &self,
        tenant_id: Uuid,
        payload: &[u8],
        signature: Option<&str>,
    ) -> AppResult<ResolvedGateway> {
        let configs = self.configs.find_active_for_tenant(tenant_id).await?;
        if configs.is_empty() {
            return Err(no_gateway(tenant_id));
        }

        for config in configs {
            let config_id = config.id;
            let resolved = match self.resolve(config).await {
                Ok(resolved) => resolved,
                Err(e) => {
                    warn!(
                        %tenant_id,
                        %config_id,
                        error = %e,
                        "skipping gateway configuration that failed to resolve"
                    );
                    continue;
                }
            };
            if resolved.adapter.validate_webhook(payload, signature) {
                return Ok(resolved);
            }
        }

        Err(GatewayError::InvalidWebhookSignature.into())
    }
}

fn no_gateway(tenant_id: Uuid) -> AppError {
    GatewayError::NoGatewayConfigured {
        tenant_id: tenant_id.to_string(),
    }
    .into()
}
