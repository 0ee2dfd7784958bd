//! Credential vault boundary
//!
//! Gateway credentials are stored encrypted; decryption happens in an
//! external vault service. This module only defines the boundary and the
//! decrypted shape. Plaintext credentials are never written back anywhere.

use crate::gateways::error::{GatewayError, GatewayResult};
use crate::gateways::http::GatewayHttpClient;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::time::Duration;

/// Decrypted gateway credentials.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GatewayCredentials {
    pub api_key: String,
    pub api_secret: Option<String>,
    /// Separate webhook signing secret; adapters fall back to their main
    /// secret when absent.
    pub webhook_secret: Option<String>,
}

#[async_trait]
pub trait CredentialVault: Send + Sync {
    /// Decrypt a stored credential bundle.
    async fn decrypt(&self, bundle: &JsonValue) -> GatewayResult<GatewayCredentials>;
}

/// Vault service client. Sends the opaque bundle out, gets plaintext
/// credentials back.
pub struct HttpCredentialVault {
    http: GatewayHttpClient,
    base_url: String,
    api_key: String,
}

impl HttpCredentialVault {
    pub fn new(base_url: String, api_key: String) -> GatewayResult<Self> {
        let http = GatewayHttpClient::new("vault", Duration::from_secs(10), 2)?;
        Ok(Self {
            http,
            base_url,
            api_key,
        })
    }
}

#[async_trait]
impl CredentialVault for HttpCredentialVault {
    async fn decrypt(&self, bundle: &JsonValue) -> GatewayResult<GatewayCredentials> {
        let url = format!("{}/v1/decrypt", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({ "bundle": bundle });

        self.http
            .request_json::<GatewayCredentials>(
                reqwest::Method::POST,
                &url,
                Some(&self.api_key),
                Some(&body),
                &[],
            )
            .await
            .map_err(|e| GatewayError::VaultError {
                message: e.to_string(),
            })
    }
}

/// Pass-through vault for tests and for running without externals: the
/// "encrypted" bundle carries the credentials under a `plaintext` key.
pub struct PlaintextVault;

impl PlaintextVault {
    /// Wrap credentials into the bundle shape this vault reads back.
    pub fn bundle(credentials: &GatewayCredentials) -> JsonValue {
        serde_json::json!({ "plaintext": credentials })
    }
}

#[async_trait]
impl CredentialVault for PlaintextVault {
    async fn decrypt(&self, bundle: &JsonValue) -> GatewayResult<GatewayCredentials> {
        let plaintext = bundle
            .get("plaintext")
            .ok_or_else(|| GatewayError::VaultError {
                message: "credential bundle has no plaintext payload".to_string(),
            })?;

        serde_json::from_value(plaintext.clone()).map_err(|e| GatewayError::VaultError {
            message: format!("credential bundle is malformed: {}", e),
        })
    }
}
