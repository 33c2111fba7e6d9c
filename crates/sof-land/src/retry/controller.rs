//! Freshness-aware retry loop.

use std::sync::Arc;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use super::{BackoffSchedule, SubmissionAttempt, SubmissionOutcome};
use crate::{
    attempt::{AttemptError, ConfirmationPolicy, send_and_confirm},
    error::ErrorKind,
    health::Endpoint,
    lease::BlockhashLeaseManager,
    payload::{PayloadAdjustments, ResignablePayload},
    providers::EndpointSelector,
    rpc::LedgerConnector,
};

/// Drives sequential submission attempts against the best endpoint and current window.
pub struct RetryController {
    /// Endpoint source; failures are reported back to it.
    selector: Arc<dyn EndpointSelector>,
    /// Validity window owner.
    leases: Arc<BlockhashLeaseManager>,
    /// Connection factory.
    connector: Arc<dyn LedgerConnector>,
    /// Delays between attempts.
    backoff: BackoffSchedule,
    /// Confirmation polling.
    confirmation: ConfirmationPolicy,
}

impl RetryController {
    /// Creates a retry controller.
    #[must_use]
    pub fn new(
        selector: Arc<dyn EndpointSelector>,
        leases: Arc<BlockhashLeaseManager>,
        connector: Arc<dyn LedgerConnector>,
    ) -> Self {
        Self {
            selector,
            leases,
            connector,
            backoff: BackoffSchedule::default(),
            confirmation: ConfirmationPolicy::default(),
        }
    }

    /// Sets the backoff schedule.
    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffSchedule) -> Self {
        self.backoff = backoff;
        self
    }

    /// Sets confirmation polling.
    #[must_use]
    pub const fn with_confirmation(mut self, confirmation: ConfirmationPolicy) -> Self {
        self.confirmation = confirmation;
        self
    }

    /// Returns the lease manager shared with other submission paths.
    #[must_use]
    pub const fn leases(&self) -> &Arc<BlockhashLeaseManager> {
        &self.leases
    }

    /// Returns the endpoint selector.
    #[must_use]
    pub const fn selector(&self) -> &Arc<dyn EndpointSelector> {
        &self.selector
    }

    /// Returns the connection factory.
    #[must_use]
    pub const fn connector(&self) -> &Arc<dyn LedgerConnector> {
        &self.connector
    }

    /// Returns confirmation polling settings.
    #[must_use]
    pub const fn confirmation(&self) -> &ConfirmationPolicy {
        &self.confirmation
    }

    /// Submits `payload` with up to `max_attempts` sequential attempts.
    ///
    /// Never fails; the terminal state is encoded in the returned outcome.
    pub async fn submit(
        &self,
        payload: &dyn ResignablePayload,
        adjustments: &PayloadAdjustments,
        max_attempts: u32,
    ) -> SubmissionOutcome {
        self.submit_with_cancel(payload, adjustments, max_attempts, &CancellationToken::new())
            .await
    }

    /// Like [`Self::submit`], stopping early once `cancel` fires.
    ///
    /// A cancelled run reports [`ErrorKind::Timeout`]; a send already handed to an endpoint may
    /// still land.
    pub async fn submit_with_cancel(
        &self,
        payload: &dyn ResignablePayload,
        adjustments: &PayloadAdjustments,
        max_attempts: u32,
        cancel: &CancellationToken,
    ) -> SubmissionOutcome {
        let max_attempts = max_attempts.max(1);
        let mut attempts = Vec::new();
        let mut saw_endpoint = false;
        let mut last_error = None;

        for number in 1..=max_attempts {
            let delay = self.backoff.delay_before(number);
            if !delay.is_zero() {
                tokio::select! {
                    () = cancel.cancelled() => {
                        last_error = Some(AttemptError::Cancelled);
                        break;
                    }
                    () = sleep(delay) => {}
                }
            }
            if cancel.is_cancelled() {
                last_error = Some(AttemptError::Cancelled);
                break;
            }

            let (attempt, result) = self.attempt_once(number, payload, adjustments, cancel).await;
            saw_endpoint |= attempt.endpoint.is_some();
            match result {
                Ok(signature) => {
                    tracing::info!(
                        attempt = number,
                        endpoint = attempt.endpoint.as_ref().map_or("none", |e| e.name.as_str()),
                        signature = %signature,
                        "submission confirmed"
                    );
                    attempts.push(attempt);
                    return SubmissionOutcome::Confirmed {
                        signature,
                        attempts,
                    };
                }
                Err(error) => {
                    self.recover(&error, attempt.endpoint.as_ref());
                    let retryable = error.is_retryable();
                    attempts.push(attempt);
                    last_error = Some(error);
                    if !retryable {
                        break;
                    }
                }
            }
        }

        let (kind, detail) = match last_error {
            Some(error @ (AttemptError::Cancelled
            | AttemptError::Sign { .. }
            | AttemptError::TransactionFailed { .. })) => (error.kind(), error.to_string()),
            Some(error) if !saw_endpoint => (ErrorKind::Unreachable, error.to_string()),
            Some(error) => (ErrorKind::ExhaustedRetries, error.to_string()),
            None => (ErrorKind::ExhaustedRetries, "no attempt ran".to_owned()),
        };
        tracing::warn!(
            attempts = attempts.len(),
            kind = kind.as_str(),
            detail = %detail,
            "submission failed"
        );
        SubmissionOutcome::Failed {
            kind,
            detail,
            attempts,
        }
    }

    /// Runs one ACQUIRE_WINDOW, SIGN, SEND, AWAIT_CONFIRMATION cycle without retrying.
    pub(crate) async fn attempt_once(
        &self,
        number: u32,
        payload: &dyn ResignablePayload,
        adjustments: &PayloadAdjustments,
        cancel: &CancellationToken,
    ) -> (SubmissionAttempt, Result<String, AttemptError>) {
        let mut attempt = SubmissionAttempt::pending(number);
        let result = self
            .run_attempt(&mut attempt, payload, adjustments, cancel)
            .await;
        attempt.finish(&result);
        if let Err(error) = &result {
            tracing::debug!(
                attempt = number,
                endpoint = attempt.endpoint.as_ref().map_or("none", |e| e.name.as_str()),
                kind = error.kind().as_str(),
                error = %error,
                "submission attempt failed"
            );
        }
        (attempt, result)
    }

    /// Fills `attempt` while it progresses.
    async fn run_attempt(
        &self,
        attempt: &mut SubmissionAttempt,
        payload: &dyn ResignablePayload,
        adjustments: &PayloadAdjustments,
        cancel: &CancellationToken,
    ) -> Result<String, AttemptError> {
        let endpoint = self
            .selector
            .select()
            .await
            .ok_or(AttemptError::NoHealthyEndpoint)?;
        attempt.endpoint = Some(endpoint.clone());
        let window = self
            .leases
            .current()
            .await
            .map_err(|source| AttemptError::Lease { source })?;
        attempt.window = Some(Arc::clone(&window));
        let signed = payload
            .resign(&window, adjustments)
            .map_err(|source| AttemptError::Sign { source })?;
        attempt.signature = Some(signed.signature.clone());
        tracing::debug!(
            attempt = attempt.number,
            endpoint = %endpoint.name,
            blockhash = %window.blockhash,
            remaining = window.remaining_at_fetch(),
            "sending attempt"
        );
        send_and_confirm(
            self.connector.as_ref(),
            &endpoint,
            &signed,
            &window,
            &self.confirmation,
            cancel,
        )
        .await
    }

    /// Applies the recovery action for a failed attempt.
    pub(crate) fn recover(&self, error: &AttemptError, endpoint: Option<&Endpoint>) {
        if error.is_blockhash_related() {
            self.leases.invalidate();
        }
        if error.is_endpoint_related()
            && let Some(endpoint) = endpoint
        {
            self.selector.report_failure(endpoint);
        }
    }
}
