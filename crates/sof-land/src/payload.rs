//! Signing boundary: payloads the engine can re-sign against a fresh validity window.

use solana_pubkey::Pubkey;
use thiserror::Error;

use crate::lease::ValidityWindow;

/// Economic incentive attached as an auxiliary transfer for guaranteed inclusion.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Incentive {
    /// Transfer recipient (the inclusion service's tip account).
    pub recipient: Pubkey,
    /// Lamports transferred.
    pub lamports: u64,
}

/// Per-submission adjustments applied when (re-)signing.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct PayloadAdjustments {
    /// Compute-unit limit; `None` leaves the payload's own value.
    pub compute_unit_limit: Option<u32>,
    /// Priority fee in micro-lamports per compute unit; `None` leaves the payload's own value.
    pub priority_fee_micro_lamports: Option<u64>,
    /// Incentive transfer for the guaranteed channel.
    pub incentive: Option<Incentive>,
}

impl PayloadAdjustments {
    /// Returns a copy carrying `incentive`.
    #[must_use]
    pub const fn with_incentive(mut self, incentive: Incentive) -> Self {
        self.incentive = Some(incentive);
        self
    }
}

/// Serialized, signed transaction ready to send.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SignedPayload {
    /// Wire bytes.
    pub bytes: Vec<u8>,
    /// Base58 signature identifying the transaction.
    pub signature: String,
}

/// Signing-layer errors.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum SignError {
    /// Window blockhash could not be decoded.
    #[error("invalid blockhash `{value}`")]
    InvalidBlockhash {
        /// Offending blockhash string.
        value: String,
    },
    /// Signer rejected the message.
    #[error("failed to sign transaction: {message}")]
    Sign {
        /// Signer error description.
        message: String,
    },
    /// Signed transaction could not be serialized.
    #[error("failed to encode signed transaction: {message}")]
    Encode {
        /// Encoder error description.
        message: String,
    },
}

/// A payload that can be re-signed against any validity window.
///
/// Each call must produce an independent signed transaction; implementations hold no per-call
/// mutable state, so the race channels can share one payload.
pub trait ResignablePayload: Send + Sync {
    /// Builds and signs the payload for `window` with `adjustments` applied.
    ///
    /// # Errors
    ///
    /// Returns [`SignError`] when the window cannot be used or signing fails.
    fn resign(
        &self,
        window: &ValidityWindow,
        adjustments: &PayloadAdjustments,
    ) -> Result<SignedPayload, SignError>;
}
