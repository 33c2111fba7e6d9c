//! Ledger client traits, response types, and transport errors.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::health::Endpoint;

/// Substrings (lowercase) that identify a rejected or unknown blockhash in RPC errors.
const BLOCKHASH_ERROR_MARKERS: [&str; 4] = [
    "blockhash not found",
    "blockhashnotfound",
    "block height exceeded",
    "blockheightexceeded",
];

/// Low-level transport errors surfaced by ledger and inclusion clients.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum TransportError {
    /// Invalid transport configuration.
    #[error("transport configuration invalid: {message}")]
    Config {
        /// Human-readable description.
        message: String,
    },
    /// HTTP request could not be completed or returned a non-success status.
    #[error("rpc request `{method}` failed: {message}")]
    Request {
        /// JSON-RPC method being called.
        method: &'static str,
        /// Human-readable description.
        message: String,
    },
    /// Endpoint answered with a JSON-RPC error object.
    #[error("rpc method `{method}` error {code}: {message}")]
    Rpc {
        /// JSON-RPC method being called.
        method: &'static str,
        /// JSON-RPC error code.
        code: i64,
        /// Human-readable message.
        message: String,
    },
    /// Endpoint answered with an envelope carrying neither result nor error.
    #[error("rpc method `{method}` returned neither result nor error")]
    MissingResultOrError {
        /// JSON-RPC method being called.
        method: &'static str,
    },
}

impl TransportError {
    /// Returns true when the endpoint rejected the transaction's blockhash.
    #[must_use]
    pub fn is_blockhash_related(&self) -> bool {
        match self {
            Self::Rpc { message, .. } => is_blockhash_message(message),
            Self::Config { .. } | Self::Request { .. } | Self::MissingResultOrError { .. } => {
                false
            }
        }
    }
}

/// Returns true when `message` describes an expired or unknown blockhash.
pub(crate) fn is_blockhash_message(message: &str) -> bool {
    let lowered = message.to_ascii_lowercase();
    BLOCKHASH_ERROR_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
}

/// Commitment level used for slot probes and confirmation polling.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
pub enum Commitment {
    /// Seen by the connected node.
    Processed,
    /// Voted on by a supermajority.
    #[default]
    Confirmed,
    /// Rooted.
    Finalized,
}

impl Commitment {
    /// Returns the JSON-RPC string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Processed => "processed",
            Self::Confirmed => "confirmed",
            Self::Finalized => "finalized",
        }
    }

    /// Parses the JSON-RPC string form.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "processed" => Some(Self::Processed),
            "confirmed" => Some(Self::Confirmed),
            "finalized" => Some(Self::Finalized),
            _ => None,
        }
    }
}

/// Latest blockhash as reported by one endpoint.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct LatestBlockhash {
    /// Base58 blockhash.
    pub blockhash: String,
    /// Last block height at which transactions using this blockhash are accepted.
    pub last_valid_block_height: u64,
}

/// Confirmation state of one signature.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum SignatureState {
    /// Endpoint has no record of the signature yet.
    Unknown,
    /// Seen, but below the requested commitment.
    Pending,
    /// Reached the requested commitment without error.
    Confirmed {
        /// Slot the transaction landed in.
        slot: u64,
    },
    /// Landed with an execution error.
    Failed {
        /// Error rendered by the endpoint.
        error: String,
    },
}

/// Send tuning applied to `sendTransaction`.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SendConfig {
    /// Skip preflight simulation when true.
    pub skip_preflight: bool,
    /// Optional preflight commitment.
    pub preflight_commitment: Option<Commitment>,
    /// Node-side rebroadcast limit; zero leaves rebroadcasting to the caller.
    pub max_retries: Option<u64>,
}

impl Default for SendConfig {
    fn default() -> Self {
        Self {
            skip_preflight: true,
            preflight_commitment: None,
            max_retries: Some(0),
        }
    }
}

/// One connection to one ledger endpoint.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Returns the endpoint's current slot.
    async fn get_slot(&self) -> Result<u64, TransportError>;

    /// Returns the endpoint's current block height.
    async fn get_block_height(&self) -> Result<u64, TransportError>;

    /// Returns the newest blockhash and its expiry height.
    async fn get_latest_blockhash(&self) -> Result<LatestBlockhash, TransportError>;

    /// Submits transaction bytes and returns the signature reported by the endpoint.
    async fn send_transaction(&self, tx_bytes: &[u8]) -> Result<String, TransportError>;

    /// Returns the confirmation state of one signature.
    async fn signature_state(&self, signature: &str) -> Result<SignatureState, TransportError>;
}

/// Opens ledger connections for configured endpoints.
pub trait LedgerConnector: Send + Sync {
    /// Opens one connection to `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Config`] when the connection cannot be created.
    fn connect(&self, endpoint: &Endpoint) -> Result<Arc<dyn LedgerClient>, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blockhash_errors_are_detected_case_insensitively() {
        let error = TransportError::Rpc {
            method: "sendTransaction",
            code: -32002,
            message: "Transaction simulation failed: Blockhash not found".to_owned(),
        };
        assert!(error.is_blockhash_related());
        assert!(is_blockhash_message("BlockhashNotFound"));
        assert!(is_blockhash_message("block height exceeded"));
    }

    #[test]
    fn request_failures_are_not_blockhash_related() {
        let error = TransportError::Request {
            method: "sendTransaction",
            message: "blockhash not found".to_owned(),
        };
        assert!(!error.is_blockhash_related());
    }

    #[test]
    fn commitment_levels_are_ordered() {
        assert!(Commitment::Processed < Commitment::Confirmed);
        assert!(Commitment::Confirmed < Commitment::Finalized);
        assert_eq!(Commitment::parse("finalized"), Some(Commitment::Finalized));
        assert_eq!(Commitment::parse("rooted"), None);
    }
}
