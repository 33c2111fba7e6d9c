//! Ledger and inclusion-service transports.

/// JSON-RPC ledger client implementation.
mod client;
/// Guaranteed-inclusion bundle client.
mod inclusion;
/// Shared ledger traits, response types, and transport errors.
mod types;

pub use client::{JsonRpcConnector, JsonRpcLedgerClient};
pub use inclusion::{InclusionService, JsonRpcInclusionService};
pub(crate) use types::is_blockhash_message;
pub use types::{
    Commitment, LatestBlockhash, LedgerClient, LedgerConnector, SendConfig, SignatureState,
    TransportError,
};
