//! Payment gateway integration layer.
//!
//! Each processor gets an adapter implementing [`PaymentGateway`]; the
//! factory builds adapters from decrypted credentials, and the manager
//! resolves which adapter serves a given tenant.

pub mod adapters;
pub mod error;
pub mod factory;
pub mod gateway;
pub mod http;
pub mod manager;
pub mod types;
pub mod vault;

pub use error::{GatewayError, GatewayResult};
pub use factory::GatewayFactory;
pub use gateway::PaymentGateway;
pub use manager::{GatewayManager, ResolvedGateway};
pub use types::{
    CreateTransactionData, CustomerInfo, GatewayKind, GatewaySettings, GatewayTransactionStatus,
    LineItem, PaymentDetails, PaymentMethod, PixTransaction, WebhookEvent,
};
pub use vault::{CredentialVault, GatewayCredentials, HttpCredentialVault, PlaintextVault};
