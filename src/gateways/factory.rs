use crate::gateways::adapters::{PaggueGateway, SuitPayGateway};
use crate::gateways::error::{GatewayError, GatewayResult};
use crate::gateways::gateway::PaymentGateway;
use crate::gateways::types::{GatewayKind, GatewaySettings};
use crate::gateways::vault::GatewayCredentials;
use std::str::FromStr;

/// Builds a ready-to-use adapter for a supported processor. Credentials
/// arrive already decrypted; the factory never reads the environment.
pub struct GatewayFactory;

impl GatewayFactory {
    pub fn build(
        kind: GatewayKind,
        credentials: &GatewayCredentials,
        settings: &GatewaySettings,
    ) -> GatewayResult<Box<dyn PaymentGateway>> {
        match kind {
            GatewayKind::SuitPay => Ok(Box::new(SuitPayGateway::from_credentials(
                credentials,
                settings,
            )?)),
            GatewayKind::Paggue => Ok(Box::new(PaggueGateway::from_credentials(
                credentials,
                settings,
            )?)),
        }
    }

    /// Same as [`build`](Self::build) but keyed by the stored type name.
    /// An unrecognized name fails before any adapter is constructed.
    pub fn build_from_name(
        name: &str,
        credentials: &GatewayCredentials,
        settings: &GatewaySettings,
    ) -> GatewayResult<Box<dyn PaymentGateway>> {
        let kind = GatewayKind::from_str(name)?;
        Self::build(kind, credentials, settings)
    }

    pub fn supported_kinds() -> &'static [GatewayKind] {
        &[GatewayKind::SuitPay, GatewayKind::Paggue]
    }
}
