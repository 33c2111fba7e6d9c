//! JSON-RPC ledger client over HTTP.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64_STANDARD};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use super::{
    Commitment, LatestBlockhash, LedgerClient, LedgerConnector, SendConfig, SignatureState,
    TransportError,
};
use crate::health::Endpoint;

/// Default HTTP timeout applied to every ledger request.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// JSON-RPC envelope.
#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    /// Result value for successful calls.
    result: Option<T>,
    /// Error payload for failed calls.
    error: Option<JsonRpcError>,
}

/// JSON-RPC error object.
#[derive(Debug, Deserialize)]
struct JsonRpcError {
    /// JSON-RPC error code.
    code: i64,
    /// Human-readable message.
    message: String,
}

/// `{ context, value }` wrapper used by context-carrying RPC methods.
#[derive(Debug, Deserialize)]
struct RpcContextual<T> {
    /// Method-specific value.
    value: T,
}

/// `getLatestBlockhash` value.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcBlockhash {
    /// Base58 blockhash.
    blockhash: String,
    /// Expiry block height.
    last_valid_block_height: u64,
}

/// One `getSignatureStatuses` entry.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcSignatureStatus {
    /// Slot the transaction was processed in.
    slot: u64,
    /// Execution error, null on success.
    err: Option<serde_json::Value>,
    /// Commitment reached so far.
    confirmation_status: Option<String>,
}

/// Opens [`JsonRpcLedgerClient`] connections, one fresh HTTP client per call.
#[derive(Debug, Clone)]
pub struct JsonRpcConnector {
    /// Per-request HTTP timeout.
    request_timeout: Duration,
    /// Commitment used for slot probes and confirmation.
    commitment: Commitment,
    /// `sendTransaction` tuning.
    send_config: SendConfig,
}

impl Default for JsonRpcConnector {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            commitment: Commitment::default(),
            send_config: SendConfig::default(),
        }
    }
}

impl JsonRpcConnector {
    /// Creates a connector with default tuning.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the per-request HTTP timeout.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the commitment used for probes and confirmation.
    #[must_use]
    pub const fn with_commitment(mut self, commitment: Commitment) -> Self {
        self.commitment = commitment;
        self
    }

    /// Sets `sendTransaction` tuning.
    #[must_use]
    pub fn with_send_config(mut self, config: SendConfig) -> Self {
        self.send_config = config;
        self
    }
}

impl LedgerConnector for JsonRpcConnector {
    fn connect(&self, endpoint: &Endpoint) -> Result<Arc<dyn LedgerClient>, TransportError> {
        let client = JsonRpcLedgerClient::new(endpoint.url.clone(), self.request_timeout)?
            .with_commitment(self.commitment)
            .with_send_config(self.send_config.clone());
        Ok(Arc::new(client))
    }
}

/// Ledger client that speaks Solana JSON-RPC to one endpoint.
#[derive(Debug, Clone)]
pub struct JsonRpcLedgerClient {
    /// HTTP client used for RPC calls.
    client: reqwest::Client,
    /// Target JSON-RPC endpoint URL.
    rpc_url: String,
    /// Commitment used for slot probes and confirmation.
    commitment: Commitment,
    /// `sendTransaction` tuning.
    send_config: SendConfig,
}

impl JsonRpcLedgerClient {
    /// Creates a JSON-RPC ledger client.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Config`] when HTTP client creation fails.
    pub fn new(rpc_url: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| TransportError::Config {
                message: error.to_string(),
            })?;
        Ok(Self {
            client,
            rpc_url: rpc_url.into(),
            commitment: Commitment::default(),
            send_config: SendConfig::default(),
        })
    }

    /// Sets the commitment used for probes and confirmation.
    #[must_use]
    pub const fn with_commitment(mut self, commitment: Commitment) -> Self {
        self.commitment = commitment;
        self
    }

    /// Sets `sendTransaction` tuning.
    #[must_use]
    pub fn with_send_config(mut self, config: SendConfig) -> Self {
        self.send_config = config;
        self
    }

    /// Returns the endpoint URL.
    #[must_use]
    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    /// Commitment config object shared by read methods.
    fn commitment_param(&self) -> serde_json::Value {
        serde_json::json!({ "commitment": self.commitment.as_str() })
    }

    /// Performs one JSON-RPC call and unwraps the envelope.
    async fn rpc_call<T: DeserializeOwned>(
        &self,
        method: &'static str,
        params: serde_json::Value,
    ) -> Result<T, TransportError> {
        rpc_call(&self.client, &self.rpc_url, method, params).await
    }
}

#[async_trait]
impl LedgerClient for JsonRpcLedgerClient {
    async fn get_slot(&self) -> Result<u64, TransportError> {
        self.rpc_call("getSlot", serde_json::json!([self.commitment_param()]))
            .await
    }

    async fn get_block_height(&self) -> Result<u64, TransportError> {
        self.rpc_call(
            "getBlockHeight",
            serde_json::json!([self.commitment_param()]),
        )
        .await
    }

    async fn get_latest_blockhash(&self) -> Result<LatestBlockhash, TransportError> {
        let response: RpcContextual<RpcBlockhash> = self
            .rpc_call(
                "getLatestBlockhash",
                serde_json::json!([self.commitment_param()]),
            )
            .await?;
        Ok(LatestBlockhash {
            blockhash: response.value.blockhash,
            last_valid_block_height: response.value.last_valid_block_height,
        })
    }

    async fn send_transaction(&self, tx_bytes: &[u8]) -> Result<String, TransportError> {
        #[derive(Debug, Serialize)]
        #[serde(rename_all = "camelCase")]
        struct RpcSendConfig {
            /// Transaction encoding format.
            encoding: &'static str,
            /// Preflight skip flag.
            skip_preflight: bool,
            /// Optional preflight commitment.
            #[serde(skip_serializing_if = "Option::is_none")]
            preflight_commitment: Option<&'static str>,
            /// Optional node-side rebroadcast limit.
            #[serde(skip_serializing_if = "Option::is_none")]
            max_retries: Option<u64>,
        }

        let encoded_tx = BASE64_STANDARD.encode(tx_bytes);
        self.rpc_call(
            "sendTransaction",
            serde_json::json!([
                encoded_tx,
                RpcSendConfig {
                    encoding: "base64",
                    skip_preflight: self.send_config.skip_preflight,
                    preflight_commitment: self
                        .send_config
                        .preflight_commitment
                        .map(Commitment::as_str),
                    max_retries: self.send_config.max_retries,
                }
            ]),
        )
        .await
    }

    async fn signature_state(&self, signature: &str) -> Result<SignatureState, TransportError> {
        let response: RpcContextual<Vec<Option<RpcSignatureStatus>>> = self
            .rpc_call(
                "getSignatureStatuses",
                serde_json::json!([[signature], { "searchTransactionHistory": false }]),
            )
            .await?;
        let status = response.value.into_iter().next().flatten();
        Ok(classify_signature_status(status, self.commitment))
    }
}

/// Maps one raw status entry to a [`SignatureState`] for the target commitment.
fn classify_signature_status(
    status: Option<RpcSignatureStatus>,
    target: Commitment,
) -> SignatureState {
    let Some(status) = status else {
        return SignatureState::Unknown;
    };
    if let Some(error) = status.err.filter(|error| !error.is_null()) {
        return SignatureState::Failed {
            error: error.to_string(),
        };
    }
    let reached = status
        .confirmation_status
        .as_deref()
        .and_then(Commitment::parse)
        .unwrap_or(Commitment::Processed);
    if reached >= target {
        SignatureState::Confirmed { slot: status.slot }
    } else {
        SignatureState::Pending
    }
}

/// Performs one JSON-RPC 2.0 call against `rpc_url`.
pub(crate) async fn rpc_call<T: DeserializeOwned>(
    client: &reqwest::Client,
    rpc_url: &str,
    method: &'static str,
    params: serde_json::Value,
) -> Result<T, TransportError> {
    let payload = serde_json::json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": method,
        "params": params,
    });
    let response = client
        .post(rpc_url)
        .json(&payload)
        .send()
        .await
        .map_err(|error| TransportError::Request {
            method,
            message: error.to_string(),
        })?;
    let response = response
        .error_for_status()
        .map_err(|error| TransportError::Request {
            method,
            message: error.to_string(),
        })?;
    let parsed: JsonRpcResponse<T> =
        response
            .json()
            .await
            .map_err(|error| TransportError::Request {
                method,
                message: format!("invalid json: {error}"),
            })?;
    if let Some(result) = parsed.result {
        return Ok(result);
    }
    if let Some(error) = parsed.error {
        return Err(TransportError::Rpc {
            method,
            code: error.code,
            message: error.message,
        });
    }
    Err(TransportError::MissingResultOrError { method })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(confirmation: Option<&str>, err: Option<serde_json::Value>) -> RpcSignatureStatus {
        RpcSignatureStatus {
            slot: 42,
            err,
            confirmation_status: confirmation.map(str::to_owned),
        }
    }

    #[test]
    fn missing_status_is_unknown() {
        assert_eq!(
            classify_signature_status(None, Commitment::Confirmed),
            SignatureState::Unknown
        );
    }

    #[test]
    fn processed_status_is_pending_for_confirmed_target() {
        assert_eq!(
            classify_signature_status(Some(status(Some("processed"), None)), Commitment::Confirmed),
            SignatureState::Pending
        );
    }

    #[test]
    fn finalized_status_satisfies_confirmed_target() {
        assert_eq!(
            classify_signature_status(Some(status(Some("finalized"), None)), Commitment::Confirmed),
            SignatureState::Confirmed { slot: 42 }
        );
    }

    #[test]
    fn execution_error_wins_over_commitment() {
        let state = classify_signature_status(
            Some(status(
                Some("confirmed"),
                Some(serde_json::json!("BlockhashNotFound")),
            )),
            Commitment::Confirmed,
        );
        assert!(matches!(state, SignatureState::Failed { .. }));
    }

    #[test]
    fn null_error_is_treated_as_success() {
        assert_eq!(
            classify_signature_status(
                Some(status(Some("confirmed"), Some(serde_json::Value::Null))),
                Commitment::Confirmed
            ),
            SignatureState::Confirmed { slot: 42 }
        );
    }
}
