//! Caller-facing failure taxonomy shared by every submission path.

/// Terminal or per-attempt failure classes reported in results.
///
/// Engine operations never return `Err`; instead the kind of the last relevant failure is encoded
/// in the returned value so the solo and race paths aggregate uniformly.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum ErrorKind {
    /// Probe/connect failure, or no healthy endpoint for every attempt.
    Unreachable,
    /// Endpoint ledger view lags the cluster beyond the configured ceiling.
    StaleLedger,
    /// The network rejected the validity window (blockhash expired or unknown).
    ValidityExpired,
    /// The guaranteed-inclusion service rejected the incentive bundle.
    EconomicFailure,
    /// No channel confirmed within its deadline.
    Timeout,
    /// Every configured attempt failed.
    ExhaustedRetries,
    /// The payload could not be re-signed for a window. Not retried.
    InvalidPayload,
    /// The transaction landed but its execution failed. Not retried.
    TransactionFailed,
}

impl ErrorKind {
    /// Returns a stable lowercase label used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unreachable => "unreachable",
            Self::StaleLedger => "stale_ledger",
            Self::ValidityExpired => "validity_expired",
            Self::EconomicFailure => "economic_failure",
            Self::Timeout => "timeout",
            Self::ExhaustedRetries => "exhausted_retries",
            Self::InvalidPayload => "invalid_payload",
            Self::TransactionFailed => "transaction_failed",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
