//! One submission attempt: send through an endpoint, then poll until confirmed or expired.

use std::time::Duration;

use thiserror::Error;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;

use crate::{
    error::ErrorKind,
    health::Endpoint,
    lease::{LeaseError, ValidityWindow},
    payload::{SignError, SignedPayload},
    rpc::{LedgerClient, LedgerConnector, SignatureState, TransportError, is_blockhash_message},
};

/// Confirmation polling tuning.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct ConfirmationPolicy {
    /// Delay between status polls.
    pub poll_interval: Duration,
    /// Upper bound on waiting for one signature.
    pub timeout: Duration,
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(400),
            timeout: Duration::from_secs(20),
        }
    }
}

/// Failure of one attempt, before it is folded into an [`ErrorKind`].
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum AttemptError {
    /// Selector had no healthy endpoint.
    #[error("no healthy endpoint available")]
    NoHealthyEndpoint,
    /// Validity window could not be acquired.
    #[error("validity window unavailable: {source}")]
    Lease {
        /// Lease failure.
        source: LeaseError,
    },
    /// Payload could not be signed for the window.
    #[error("payload signing failed: {source}")]
    Sign {
        /// Signing failure.
        source: SignError,
    },
    /// Endpoint connection or send failed for a reason unrelated to the blockhash.
    #[error("send through `{endpoint}` failed: {source}")]
    Send {
        /// Endpoint name.
        endpoint: String,
        /// Transport failure.
        source: TransportError,
    },
    /// Network rejected the window, or the window expired before confirmation.
    #[error("validity window expired: {detail}")]
    ValidityExpired {
        /// What reported the expiry.
        detail: String,
    },
    /// Transaction landed with an execution error.
    #[error("transaction {signature} failed: {error}")]
    TransactionFailed {
        /// Transaction signature.
        signature: String,
        /// Execution error reported by the endpoint.
        error: String,
    },
    /// Inclusion service rejected the incentive bundle.
    #[error("inclusion service rejected bundle: {source}")]
    InclusionRejected {
        /// Transport failure reported by the service.
        source: TransportError,
    },
    /// Signature did not reach the target commitment in time.
    #[error("signature {signature} not confirmed within {timeout_ms}ms")]
    ConfirmationTimeout {
        /// Transaction signature.
        signature: String,
        /// Budget that elapsed.
        timeout_ms: u64,
    },
    /// Local work was cancelled; the send may still land.
    #[error("attempt cancelled")]
    Cancelled,
}

impl AttemptError {
    /// Returns the caller-facing failure class.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NoHealthyEndpoint | Self::Send { .. } => ErrorKind::Unreachable,
            Self::Lease { source } => match source {
                LeaseError::NoHealthyEndpoint | LeaseError::Transport { .. } => {
                    ErrorKind::Unreachable
                }
                LeaseError::InsufficientValidity { .. } => ErrorKind::StaleLedger,
            },
            Self::Sign { .. } => ErrorKind::InvalidPayload,
            Self::ValidityExpired { .. } => ErrorKind::ValidityExpired,
            Self::TransactionFailed { .. } => ErrorKind::TransactionFailed,
            Self::InclusionRejected { .. } => ErrorKind::EconomicFailure,
            Self::ConfirmationTimeout { .. } | Self::Cancelled => ErrorKind::Timeout,
        }
    }

    /// Returns true when another attempt could succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::Sign { .. } | Self::TransactionFailed { .. } | Self::Cancelled
        )
    }

    /// Returns true when the failure points at the validity window.
    #[must_use]
    pub const fn is_blockhash_related(&self) -> bool {
        matches!(self, Self::ValidityExpired { .. })
    }

    /// Returns true when the failure points at the endpoint.
    #[must_use]
    pub const fn is_endpoint_related(&self) -> bool {
        matches!(
            self,
            Self::Send { .. } | Self::Lease { .. } | Self::ConfirmationTimeout { .. }
        )
    }
}

/// Sends `signed` through `endpoint` and waits for confirmation.
pub(crate) async fn send_and_confirm(
    connector: &dyn LedgerConnector,
    endpoint: &Endpoint,
    signed: &SignedPayload,
    window: &ValidityWindow,
    policy: &ConfirmationPolicy,
    cancel: &CancellationToken,
) -> Result<String, AttemptError> {
    let send_error = |source: TransportError| {
        if source.is_blockhash_related() {
            AttemptError::ValidityExpired {
                detail: source.to_string(),
            }
        } else {
            AttemptError::Send {
                endpoint: endpoint.name.clone(),
                source,
            }
        }
    };
    let client = connector.connect(endpoint).map_err(send_error)?;
    let sent = tokio::select! {
        () = cancel.cancelled() => return Err(AttemptError::Cancelled),
        sent = client.send_transaction(&signed.bytes) => sent.map_err(send_error)?,
    };
    if sent != signed.signature {
        tracing::debug!(
            endpoint = %endpoint.name,
            expected = %signed.signature,
            reported = %sent,
            "endpoint reported a different signature; polling the signed one"
        );
    }
    await_confirmation(client.as_ref(), &signed.signature, window, policy, cancel).await?;
    Ok(signed.signature.clone())
}

/// Polls `signature` until it reaches the client's commitment, fails, or outlives `window`.
pub(crate) async fn await_confirmation(
    client: &dyn LedgerClient,
    signature: &str,
    window: &ValidityWindow,
    policy: &ConfirmationPolicy,
    cancel: &CancellationToken,
) -> Result<(), AttemptError> {
    let started_at = Instant::now();
    loop {
        if cancel.is_cancelled() {
            return Err(AttemptError::Cancelled);
        }
        match client.signature_state(signature).await {
            Ok(SignatureState::Confirmed { slot }) => {
                tracing::debug!(signature, slot, "signature confirmed");
                return Ok(());
            }
            Ok(SignatureState::Failed { error }) => {
                if is_blockhash_message(&error) {
                    return Err(AttemptError::ValidityExpired { detail: error });
                }
                return Err(AttemptError::TransactionFailed {
                    signature: signature.to_owned(),
                    error,
                });
            }
            Ok(SignatureState::Pending) => {}
            Ok(SignatureState::Unknown) => {
                if let Ok(height) = client.get_block_height().await
                    && window.is_expired_at(height)
                {
                    return Err(AttemptError::ValidityExpired {
                        detail: format!(
                            "block height {height} passed last valid height {}",
                            window.last_valid_block_height
                        ),
                    });
                }
            }
            Err(error) => {
                tracing::debug!(signature, error = %error, "signature status poll failed");
            }
        }
        if started_at.elapsed() >= policy.timeout {
            return Err(AttemptError::ConfirmationTimeout {
                signature: signature.to_owned(),
                timeout_ms: crate::health::duration_to_ms_u64(policy.timeout),
            });
        }
        tokio::select! {
            () = cancel.cancelled() => return Err(AttemptError::Cancelled),
            () = sleep(policy.poll_interval) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::SystemTime};

    use super::*;
    use crate::test_support::{MockCluster, MockLedger};

    fn window(last_valid_block_height: u64) -> ValidityWindow {
        ValidityWindow {
            blockhash: "hash".to_owned(),
            last_valid_block_height,
            block_height_at_fetch: last_valid_block_height.saturating_sub(150),
            source_endpoint: "mock-0".to_owned(),
            fetched_at: SystemTime::now(),
        }
    }

    fn signed() -> SignedPayload {
        SignedPayload {
            bytes: b"tx:hash:0".to_vec(),
            signature: "sig:hash:0".to_owned(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn confirms_after_pending_polls() {
        let ledger = Arc::new(MockLedger::new().with_signature_states(vec![
            SignatureState::Unknown,
            SignatureState::Pending,
            SignatureState::Confirmed { slot: 9 },
        ]));
        let (cluster, endpoints) = MockCluster::single(Arc::clone(&ledger));
        let endpoint = endpoints.first().cloned();
        assert!(endpoint.is_some());
        if let Some(endpoint) = endpoint {
            let result = send_and_confirm(
                &cluster,
                &endpoint,
                &signed(),
                &window(1_150),
                &ConfirmationPolicy::default(),
                &CancellationToken::new(),
            )
            .await;
            assert_eq!(result, Ok("sig:hash:0".to_owned()));
        }
        assert_eq!(ledger.status_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn blockhash_send_error_is_validity_expired() {
        let ledger = Arc::new(MockLedger::new().with_send_results(vec![Err(
            TransportError::Rpc {
                method: "sendTransaction",
                code: -32002,
                message: "Blockhash not found".to_owned(),
            },
        )]));
        let (cluster, endpoints) = MockCluster::single(ledger);
        if let Some(endpoint) = endpoints.first() {
            let result = send_and_confirm(
                &cluster,
                endpoint,
                &signed(),
                &window(1_150),
                &ConfirmationPolicy::default(),
                &CancellationToken::new(),
            )
            .await;
            assert!(matches!(result, Err(AttemptError::ValidityExpired { .. })));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_signature_past_window_is_validity_expired() {
        let ledger = Arc::new(
            MockLedger::new()
                .with_block_height(1_151)
                .with_default_state(SignatureState::Unknown),
        );
        let client: Arc<dyn LedgerClient> = ledger;
        let result = await_confirmation(
            client.as_ref(),
            "sig",
            &window(1_150),
            &ConfirmationPolicy::default(),
            &CancellationToken::new(),
        )
        .await;
        assert!(matches!(result, Err(AttemptError::ValidityExpired { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn pending_signature_times_out() {
        let ledger = Arc::new(MockLedger::new().with_default_state(SignatureState::Pending));
        let client: Arc<dyn LedgerClient> = ledger;
        let policy = ConfirmationPolicy {
            poll_interval: Duration::from_millis(100),
            timeout: Duration::from_millis(1_000),
        };
        let result = await_confirmation(
            client.as_ref(),
            "sig",
            &window(1_150),
            &policy,
            &CancellationToken::new(),
        )
        .await;
        assert_eq!(
            result,
            Err(AttemptError::ConfirmationTimeout {
                signature: "sig".to_owned(),
                timeout_ms: 1_000,
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_polling() {
        let ledger = Arc::new(MockLedger::new().with_default_state(SignatureState::Pending));
        let client: Arc<dyn LedgerClient> = ledger;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = await_confirmation(
            client.as_ref(),
            "sig",
            &window(1_150),
            &ConfirmationPolicy::default(),
            &cancel,
        )
        .await;
        assert_eq!(result, Err(AttemptError::Cancelled));
    }

    #[test]
    fn execution_failures_are_terminal() {
        let error = AttemptError::TransactionFailed {
            signature: "sig".to_owned(),
            error: "InstructionError".to_owned(),
        };
        assert!(!error.is_retryable());
        assert_eq!(error.kind(), ErrorKind::TransactionFailed);
        assert!(AttemptError::NoHealthyEndpoint.is_retryable());
        assert_eq!(
            AttemptError::InclusionRejected {
                source: TransportError::Config {
                    message: "rejected".to_owned(),
                },
            }
            .kind(),
            ErrorKind::EconomicFailure
        );
    }
}
