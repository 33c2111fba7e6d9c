//! Guaranteed-inclusion (bundle) service client.

use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64_STANDARD};

use super::{TransportError, client::rpc_call};

/// Service that accepts incentive-carrying bundles for priority inclusion.
#[async_trait]
pub trait InclusionService: Send + Sync {
    /// Submits one bundle of serialized transactions and returns the service's bundle id.
    async fn submit_bundle(&self, transactions: &[Vec<u8>]) -> Result<String, TransportError>;
}

/// Bundle client that speaks the block-engine `sendBundle` JSON-RPC method.
#[derive(Debug, Clone)]
pub struct JsonRpcInclusionService {
    /// HTTP client used for bundle calls.
    client: reqwest::Client,
    /// Bundle endpoint URL (for example `https://<engine>/api/v1/bundles`).
    bundle_url: String,
}

impl JsonRpcInclusionService {
    /// Creates a bundle client.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Config`] when HTTP client creation fails.
    pub fn new(bundle_url: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| TransportError::Config {
                message: error.to_string(),
            })?;
        Ok(Self {
            client,
            bundle_url: bundle_url.into(),
        })
    }
}

#[async_trait]
impl InclusionService for JsonRpcInclusionService {
    async fn submit_bundle(&self, transactions: &[Vec<u8>]) -> Result<String, TransportError> {
        if transactions.is_empty() {
            return Err(TransportError::Config {
                message: "bundle must contain at least one transaction".to_owned(),
            });
        }
        let encoded: Vec<String> = transactions
            .iter()
            .map(|tx| BASE64_STANDARD.encode(tx))
            .collect();
        rpc_call(
            &self.client,
            &self.bundle_url,
            "sendBundle",
            serde_json::json!([encoded, { "encoding": "base64" }]),
        )
        .await
    }
}
