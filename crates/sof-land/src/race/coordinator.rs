//! Dual-channel race between a plain send and an incentive bundle.
//!
//! Cancelling a channel only stops local work. A fast-channel send already accepted by an
//! endpoint may still land after the guaranteed channel won, so callers must treat a raced
//! payload as submitted at least once. The same holds for an accepted bundle whose channel
//! found no healthy endpoint to confirm it within the confirmation budget: the channel reports
//! [`ErrorKind::Unreachable`] while the bundle may still land.

use std::{sync::Arc, time::Duration};

use solana_pubkey::Pubkey;
use tokio::{
    task::JoinHandle,
    time::{Instant, sleep, timeout},
};
use tokio_util::sync::CancellationToken;

use super::{Channel, ChannelStatus, IncentivePolicy, RaceResult, clamp_risk};
use crate::{
    attempt::{AttemptError, await_confirmation},
    error::ErrorKind,
    health::Endpoint,
    payload::{Incentive, PayloadAdjustments, ResignablePayload},
    retry::{RetryController, SubmissionAttempt, SubmissionOutcome},
    rpc::InclusionService,
};

/// Time a cancelled channel gets to report its attempt before it is aborted.
const STOPPED_CHANNEL_GRACE: Duration = Duration::from_millis(250);

/// Attempt record and result reported by one channel task.
type ChannelRun = (SubmissionAttempt, Result<String, AttemptError>);

/// Guaranteed-inclusion channel wiring.
#[derive(Clone)]
pub struct GuaranteedChannel {
    /// Bundle service.
    pub service: Arc<dyn InclusionService>,
    /// Account receiving the incentive transfer.
    pub recipient: Pubkey,
}

/// Runs the fast and guaranteed channels concurrently and keeps the first confirmation.
pub struct RaceCoordinator {
    /// Shared retry machinery; the fast channel runs one attempt through it.
    retry: Arc<RetryController>,
    /// Guaranteed channel, `None` when no inclusion service is configured.
    guaranteed: Option<GuaranteedChannel>,
    /// Risk at or above which both channels run.
    race_threshold: f64,
    /// Attempts for the solo path when the race is not scheduled.
    solo_attempts: u32,
}

impl RaceCoordinator {
    /// Creates a coordinator.
    #[must_use]
    pub fn new(
        retry: Arc<RetryController>,
        guaranteed: Option<GuaranteedChannel>,
        race_threshold: f64,
        solo_attempts: u32,
    ) -> Self {
        Self {
            retry,
            guaranteed,
            race_threshold: clamp_risk(race_threshold),
            solo_attempts: solo_attempts.max(1),
        }
    }

    /// Races `payload` across both channels, or runs the solo retry path when risk is below the
    /// race threshold or no guaranteed channel exists.
    ///
    /// Never fails; the outcome, including per-channel statuses and attempts, is encoded in the
    /// result. `elapsed` is measured at the decision; a channel stopped by that decision is then
    /// briefly awaited so its attempt is still recorded.
    pub async fn race(
        &self,
        payload: Arc<dyn ResignablePayload>,
        adjustments: PayloadAdjustments,
        incentive_policy: &IncentivePolicy,
        risk: f64,
        race_timeout: Duration,
    ) -> RaceResult {
        let risk = clamp_risk(risk);
        let started_at = Instant::now();
        let guaranteed = match &self.guaranteed {
            Some(channel) if risk >= self.race_threshold => channel.clone(),
            _ => {
                tracing::debug!(
                    risk,
                    threshold = self.race_threshold,
                    inclusion = self.guaranteed.is_some(),
                    "race not scheduled; using solo retry path"
                );
                return self
                    .solo(payload.as_ref(), &adjustments, race_timeout, started_at)
                    .await;
            }
        };

        let lamports = incentive_policy.incentive_for(risk);
        let guaranteed_adjustments = adjustments.with_incentive(Incentive {
            recipient: guaranteed.recipient,
            lamports,
        });
        let fast_cancel = CancellationToken::new();
        let guaranteed_cancel = CancellationToken::new();
        let mut fast_task = self.spawn_fast(Arc::clone(&payload), adjustments, &fast_cancel);
        let mut guaranteed_task = spawn_guaranteed(
            Arc::clone(&self.retry),
            guaranteed.service,
            payload,
            guaranteed_adjustments,
            guaranteed_cancel.clone(),
        );
        tracing::debug!(risk, incentive_lamports = lamports, "race started");

        let deadline = sleep(race_timeout);
        tokio::pin!(deadline);
        let mut fast: Option<ChannelStatus> = None;
        let mut guaranteed_status: Option<ChannelStatus> = None;
        let mut fast_attempts = Vec::new();
        let mut guaranteed_attempt = None;
        let mut fast_error = None;
        let mut guaranteed_error = None;
        let mut winner = Channel::None;
        let mut signature = None;

        while fast.is_none() || guaranteed_status.is_none() {
            tokio::select! {
                joined = &mut fast_task, if fast.is_none() => {
                    let (attempt, result) = joined.unwrap_or_else(|error| {
                        tracing::warn!(error = %error, "fast channel task stopped abnormally");
                        (SubmissionAttempt::cancelled(1), Err(AttemptError::Cancelled))
                    });
                    match result {
                        Ok(confirmed) => {
                            fast = Some(ChannelStatus::Success);
                            winner = Channel::Fast;
                            signature = Some(confirmed);
                            guaranteed_cancel.cancel();
                            guaranteed_status.get_or_insert(ChannelStatus::Cancelled);
                        }
                        Err(error) => {
                            self.retry.recover(&error, attempt.endpoint.as_ref());
                            fast = Some(ChannelStatus::Failed(error.kind()));
                            fast_error = Some(error);
                        }
                    }
                    fast_attempts.push(attempt);
                }
                joined = &mut guaranteed_task, if guaranteed_status.is_none() => {
                    let (attempt, result) = joined.unwrap_or_else(|error| {
                        tracing::warn!(error = %error, "guaranteed channel task stopped abnormally");
                        (SubmissionAttempt::cancelled(1), Err(AttemptError::Cancelled))
                    });
                    match result {
                        Ok(confirmed) => {
                            guaranteed_status = Some(ChannelStatus::Success);
                            winner = Channel::Guaranteed;
                            signature = Some(confirmed);
                            fast_cancel.cancel();
                            fast.get_or_insert(ChannelStatus::Cancelled);
                        }
                        Err(error) => {
                            self.retry.recover(&error, attempt.endpoint.as_ref());
                            guaranteed_status = Some(ChannelStatus::Failed(error.kind()));
                            guaranteed_error = Some(error);
                        }
                    }
                    guaranteed_attempt = Some(attempt);
                }
                () = &mut deadline => {
                    fast_cancel.cancel();
                    guaranteed_cancel.cancel();
                    fast.get_or_insert(ChannelStatus::TimedOut);
                    guaranteed_status.get_or_insert(ChannelStatus::TimedOut);
                }
            }
        }
        let elapsed = started_at.elapsed();

        if fast_attempts.is_empty() {
            fast_attempts.push(self.collect_stopped(&mut fast_task, Channel::Fast).await);
        }
        if guaranteed_attempt.is_none() {
            guaranteed_attempt =
                Some(self.collect_stopped(&mut guaranteed_task, Channel::Guaranteed).await);
        }

        let fast = fast.unwrap_or(ChannelStatus::TimedOut);
        let guaranteed = guaranteed_status.unwrap_or(ChannelStatus::TimedOut);
        let error_kind = match winner {
            Channel::None => Some(race_failure_kind(
                fast,
                guaranteed,
                fast_error.as_ref(),
                guaranteed_error.as_ref(),
            )),
            Channel::Fast | Channel::Guaranteed => None,
        };
        let incentive_paid = if winner == Channel::Guaranteed {
            lamports
        } else {
            0
        };
        tracing::info!(
            winner = winner.as_str(),
            fast = ?fast,
            guaranteed = ?guaranteed,
            incentive_paid,
            elapsed_ms = crate::health::duration_to_ms_u64(elapsed),
            "race finished"
        );
        RaceResult {
            winner,
            elapsed,
            incentive_paid,
            fast,
            guaranteed,
            signature,
            error_kind,
            fast_attempts,
            guaranteed_attempt,
        }
    }

    /// Spawns the fast channel: one attempt, no internal retry.
    fn spawn_fast(
        &self,
        payload: Arc<dyn ResignablePayload>,
        adjustments: PayloadAdjustments,
        cancel: &CancellationToken,
    ) -> JoinHandle<ChannelRun> {
        let retry = Arc::clone(&self.retry);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            retry
                .attempt_once(1, payload.as_ref(), &adjustments, &cancel)
                .await
        })
    }

    /// Collects the attempt of a channel stopped by the other channel's win or the deadline.
    ///
    /// The task was already cancelled; it gets [`STOPPED_CHANNEL_GRACE`] to report before it is
    /// aborted and recorded as cancelled.
    async fn collect_stopped(
        &self,
        task: &mut JoinHandle<ChannelRun>,
        channel: Channel,
    ) -> SubmissionAttempt {
        match timeout(STOPPED_CHANNEL_GRACE, &mut *task).await {
            Ok(Ok((attempt, result))) => {
                match &result {
                    Ok(signature) => tracing::warn!(
                        channel = channel.as_str(),
                        signature = %signature,
                        "channel confirmed after the race was decided"
                    ),
                    Err(error) => self.retry.recover(error, attempt.endpoint.as_ref()),
                }
                attempt
            }
            Ok(Err(error)) => {
                tracing::warn!(
                    channel = channel.as_str(),
                    error = %error,
                    "stopped channel task ended abnormally"
                );
                SubmissionAttempt::cancelled(1)
            }
            Err(_elapsed) => {
                task.abort();
                tracing::debug!(channel = channel.as_str(), "stopped channel aborted");
                SubmissionAttempt::cancelled(1)
            }
        }
    }

    /// Runs the retry controller alone under the race deadline.
    ///
    /// The deadline cancels the run instead of dropping it, so attempts already sent stay in
    /// the result.
    async fn solo(
        &self,
        payload: &dyn ResignablePayload,
        adjustments: &PayloadAdjustments,
        race_timeout: Duration,
        started_at: Instant,
    ) -> RaceResult {
        let cancel = CancellationToken::new();
        let submission =
            self.retry
                .submit_with_cancel(payload, adjustments, self.solo_attempts, &cancel);
        tokio::pin!(submission);
        let deadline = sleep(race_timeout);
        tokio::pin!(deadline);
        let mut deadline_hit = false;
        let submitted = loop {
            tokio::select! {
                outcome = &mut submission => break outcome,
                () = &mut deadline, if !deadline_hit => {
                    deadline_hit = true;
                    cancel.cancel();
                }
            }
        };
        let (fast, signature, error_kind, fast_attempts) = match submitted {
            SubmissionOutcome::Confirmed {
                signature,
                attempts,
            } => (ChannelStatus::Success, Some(signature), None, attempts),
            SubmissionOutcome::Failed { attempts, .. } if deadline_hit => (
                ChannelStatus::TimedOut,
                None,
                Some(ErrorKind::Timeout),
                attempts,
            ),
            SubmissionOutcome::Failed { kind, attempts, .. } => {
                (ChannelStatus::Failed(kind), None, Some(kind), attempts)
            }
        };
        RaceResult {
            winner: if signature.is_some() {
                Channel::Fast
            } else {
                Channel::None
            },
            elapsed: started_at.elapsed(),
            incentive_paid: 0,
            fast,
            guaranteed: ChannelStatus::NotScheduled,
            signature,
            error_kind,
            fast_attempts,
            guaranteed_attempt: None,
        }
    }
}

/// Spawns the guaranteed channel: sign with incentive, submit the bundle, poll for confirmation.
fn spawn_guaranteed(
    retry: Arc<RetryController>,
    service: Arc<dyn InclusionService>,
    payload: Arc<dyn ResignablePayload>,
    adjustments: PayloadAdjustments,
    cancel: CancellationToken,
) -> JoinHandle<ChannelRun> {
    tokio::spawn(async move {
        let mut attempt = SubmissionAttempt::pending(1);
        let result = run_guaranteed(
            &mut attempt,
            &retry,
            service.as_ref(),
            payload.as_ref(),
            &adjustments,
            &cancel,
        )
        .await;
        attempt.finish(&result);
        (attempt, result)
    })
}

/// Fills `attempt` while the guaranteed channel progresses.
async fn run_guaranteed(
    attempt: &mut SubmissionAttempt,
    retry: &RetryController,
    service: &dyn InclusionService,
    payload: &dyn ResignablePayload,
    adjustments: &PayloadAdjustments,
    cancel: &CancellationToken,
) -> Result<String, AttemptError> {
    let window = retry
        .leases()
        .current()
        .await
        .map_err(|source| AttemptError::Lease { source })?;
    attempt.window = Some(Arc::clone(&window));
    let signed = payload
        .resign(&window, adjustments)
        .map_err(|source| AttemptError::Sign { source })?;
    attempt.signature = Some(signed.signature.clone());
    let bundle = [signed.bytes.clone()];
    let bundle_id = tokio::select! {
        () = cancel.cancelled() => return Err(AttemptError::Cancelled),
        submitted = service.submit_bundle(&bundle) => {
            submitted.map_err(|source| AttemptError::InclusionRejected { source })?
        }
    };
    tracing::debug!(
        bundle_id = %bundle_id,
        signature = %signed.signature,
        "incentive bundle accepted"
    );
    let endpoint = select_for_confirmation(retry, cancel).await?;
    attempt.endpoint = Some(endpoint.clone());
    let client = retry
        .connector()
        .connect(&endpoint)
        .map_err(|source| AttemptError::Send {
            endpoint: endpoint.name.clone(),
            source,
        })?;
    await_confirmation(
        client.as_ref(),
        &signed.signature,
        &window,
        retry.confirmation(),
        cancel,
    )
    .await?;
    Ok(signed.signature)
}

/// Picks an endpoint to poll an accepted bundle, retrying selection every poll interval until
/// the confirmation budget runs out.
async fn select_for_confirmation(
    retry: &RetryController,
    cancel: &CancellationToken,
) -> Result<Endpoint, AttemptError> {
    let policy = retry.confirmation();
    let started_at = Instant::now();
    loop {
        if let Some(endpoint) = retry.selector().select().await {
            return Ok(endpoint);
        }
        if started_at.elapsed() >= policy.timeout {
            return Err(AttemptError::NoHealthyEndpoint);
        }
        tracing::debug!("no healthy endpoint to confirm accepted bundle; retrying selection");
        tokio::select! {
            () = cancel.cancelled() => return Err(AttemptError::Cancelled),
            () = sleep(policy.poll_interval) => {}
        }
    }
}

/// Failure class of a race nobody won.
///
/// A deadline hit on either channel is a timeout; an inclusion rejection is an economic failure;
/// otherwise the fast channel's failure is reported.
fn race_failure_kind(
    fast: ChannelStatus,
    guaranteed: ChannelStatus,
    fast_error: Option<&AttemptError>,
    guaranteed_error: Option<&AttemptError>,
) -> ErrorKind {
    if fast == ChannelStatus::TimedOut || guaranteed == ChannelStatus::TimedOut {
        return ErrorKind::Timeout;
    }
    if let Some(error @ AttemptError::InclusionRejected { .. }) = guaranteed_error {
        return error.kind();
    }
    fast_error
        .or(guaranteed_error)
        .map_or(ErrorKind::Timeout, AttemptError::kind)
}
