//! Risk-driven strategy selection over the retry controller and the race coordinator.

use std::{sync::Arc, time::Duration};

use tokio::time::Instant;

use crate::{
    config::EngineConfig,
    error::ErrorKind,
    health::{EndpointHealthMonitor, duration_to_ms_u64},
    lease::BlockhashLeaseManager,
    payload::{PayloadAdjustments, ResignablePayload},
    providers::{ComputeBudgetSource, EndpointSelector, PriorityFeeSource},
    race::{Channel, GuaranteedChannel, RaceCoordinator, RaceResult, clamp_risk},
    retry::{RetryController, SubmissionOutcome},
    rpc::{
        InclusionService, JsonRpcConnector, JsonRpcInclusionService, LedgerConnector,
        TransportError,
    },
};

/// Risk boundaries between strategies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskThresholds {
    /// At or above this, retries pay a bumped priority fee.
    pub low: f64,
    /// At or above this, both channels race.
    pub high: f64,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            low: 0.4,
            high: 0.8,
        }
    }
}

impl RiskThresholds {
    /// Returns thresholds clamped into `[0, 1]` with `low <= high`.
    #[must_use]
    pub fn normalized(self) -> Self {
        let low = clamp_risk(self.low);
        let high = clamp_risk(self.high);
        Self {
            low: low.min(high),
            high,
        }
    }
}

/// Submission strategy chosen for one payload.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Strategy {
    /// Plain retries at the base priority fee.
    RetryOnly,
    /// Retries with a risk-scaled priority fee.
    ElevatedRetry,
    /// Fast and guaranteed channels in parallel.
    Race,
}

impl Strategy {
    /// Returns a stable lowercase label used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RetryOnly => "retry_only",
            Self::ElevatedRetry => "elevated_retry",
            Self::Race => "race",
        }
    }
}

/// Picks the strategy for a risk score; NaN counts as zero risk.
#[must_use]
pub fn choose_strategy(risk: f64, thresholds: &RiskThresholds) -> Strategy {
    let risk = clamp_risk(risk);
    let thresholds = thresholds.normalized();
    if risk >= thresholds.high {
        Strategy::Race
    } else if risk >= thresholds.low {
        Strategy::ElevatedRetry
    } else {
        Strategy::RetryOnly
    }
}

/// Scales `priority_fee` by `1 + risk²`, saturating at `u64::MAX`.
#[must_use]
pub fn bump_priority_fee(priority_fee: u64, risk: f64) -> u64 {
    let risk = clamp_risk(risk);
    let bumped = (priority_fee as f64 * (1.0 + risk * risk)).round();
    // `as` saturates at u64::MAX.
    bumped as u64
}

/// Uniform result of [`ReliabilityEngine::send`].
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SendResult {
    /// A channel confirmed the payload.
    pub success: bool,
    /// Confirmed signature.
    pub confirmation_id: Option<String>,
    /// Channel that confirmed.
    pub channel_used: Channel,
    /// Strategy chosen for the risk score.
    pub strategy: Strategy,
    /// Submission attempts made across every channel used.
    pub attempts: u32,
    /// Wall time spent in `send`.
    pub elapsed_ms: u64,
    /// Incentive lamports paid; zero unless the guaranteed channel confirmed.
    pub incentive_paid: u64,
    /// Failure class when nothing confirmed.
    pub error_kind: Option<ErrorKind>,
}

/// Entry point: chooses a strategy from a risk score and submits through it.
pub struct ReliabilityEngine {
    /// Normalized configuration.
    config: EngineConfig,
    /// Endpoint monitor, also the selector of every path.
    monitor: Arc<EndpointHealthMonitor>,
    /// Shared retry controller.
    retry: Arc<RetryController>,
    /// Race coordinator over the same retry controller.
    race: RaceCoordinator,
    /// Priority fee collaborator.
    fees: Arc<dyn PriorityFeeSource>,
    /// Compute budget collaborator.
    compute: Arc<dyn ComputeBudgetSource>,
}

impl ReliabilityEngine {
    /// Wires an engine from explicit transports.
    ///
    /// The race runs only when both `inclusion` and an incentive recipient are available.
    #[must_use]
    pub fn new(
        config: EngineConfig,
        connector: Arc<dyn LedgerConnector>,
        inclusion: Option<Arc<dyn InclusionService>>,
        fees: Arc<dyn PriorityFeeSource>,
        compute: Arc<dyn ComputeBudgetSource>,
    ) -> Self {
        let config = config.normalized();
        let monitor = Arc::new(EndpointHealthMonitor::new(
            config.endpoints.clone(),
            Arc::clone(&connector),
            config.health,
        ));
        let selector: Arc<dyn EndpointSelector> = monitor.clone();
        let leases = Arc::new(BlockhashLeaseManager::new(
            Arc::clone(&selector),
            Arc::clone(&connector),
            config.refresh_threshold,
        ));
        let retry = Arc::new(
            RetryController::new(selector, leases, connector)
                .with_backoff(config.backoff.clone())
                .with_confirmation(config.confirmation),
        );
        let guaranteed = match (inclusion, config.incentive_recipient) {
            (Some(service), Some(recipient)) => Some(GuaranteedChannel { service, recipient }),
            (Some(_), None) => {
                tracing::warn!("inclusion service configured without incentive recipient; race disabled");
                None
            }
            (None, _) => None,
        };
        let race = RaceCoordinator::new(
            Arc::clone(&retry),
            guaranteed,
            config.risk.high,
            config.max_attempts,
        );
        Self {
            config,
            monitor,
            retry,
            race,
            fees,
            compute,
        }
    }

    /// Wires an engine over JSON-RPC endpoints and the configured bundle service.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Config`] when the bundle HTTP client cannot be built.
    pub fn with_json_rpc(
        config: EngineConfig,
        fees: Arc<dyn PriorityFeeSource>,
        compute: Arc<dyn ComputeBudgetSource>,
    ) -> Result<Self, TransportError> {
        let connector = JsonRpcConnector::new()
            .with_request_timeout(config.request_timeout)
            .with_commitment(config.commitment);
        let inclusion = match &config.inclusion_url {
            Some(url) => {
                let service: Arc<dyn InclusionService> =
                    Arc::new(JsonRpcInclusionService::new(url.clone(), config.request_timeout)?);
                Some(service)
            }
            None => None,
        };
        Ok(Self::new(config, Arc::new(connector), inclusion, fees, compute))
    }

    /// Returns the normalized configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the endpoint monitor.
    #[must_use]
    pub const fn monitor(&self) -> &Arc<EndpointHealthMonitor> {
        &self.monitor
    }

    /// Returns the lease manager.
    #[must_use]
    pub fn leases(&self) -> &Arc<BlockhashLeaseManager> {
        self.retry.leases()
    }

    /// Submits `payload` with the strategy implied by `risk`.
    ///
    /// Never fails; every outcome is encoded in the returned [`SendResult`].
    pub async fn send(&self, payload: Arc<dyn ResignablePayload>, risk: f64) -> SendResult {
        let started_at = Instant::now();
        let risk = clamp_risk(risk);
        let strategy = choose_strategy(risk, &self.config.risk);
        let base_fee = self
            .fees
            .priority_fee()
            .unwrap_or(self.config.default_priority_fee);
        let compute_units = self
            .compute
            .compute_units()
            .unwrap_or(self.config.default_compute_units);
        let priority_fee = match strategy {
            Strategy::RetryOnly => base_fee,
            Strategy::ElevatedRetry | Strategy::Race => bump_priority_fee(base_fee, risk),
        };
        let adjustments = PayloadAdjustments {
            compute_unit_limit: Some(compute_units),
            priority_fee_micro_lamports: Some(priority_fee),
            incentive: None,
        };
        tracing::info!(
            risk,
            strategy = strategy.as_str(),
            priority_fee,
            compute_units,
            "submission strategy chosen"
        );

        let result = match strategy {
            Strategy::RetryOnly | Strategy::ElevatedRetry => {
                let outcome = self
                    .retry
                    .submit(payload.as_ref(), &adjustments, self.config.max_attempts)
                    .await;
                from_outcome(outcome, strategy, started_at.elapsed())
            }
            Strategy::Race => {
                let race = self
                    .race
                    .race(
                        payload,
                        adjustments,
                        &self.config.incentive,
                        risk,
                        self.config.race_timeout,
                    )
                    .await;
                from_race(race, started_at.elapsed())
            }
        };
        tracing::info!(
            success = result.success,
            strategy = strategy.as_str(),
            channel = result.channel_used.as_str(),
            attempts = result.attempts,
            elapsed_ms = result.elapsed_ms,
            error_kind = result.error_kind.map_or("none", ErrorKind::as_str),
            "submission finished"
        );
        result
    }
}

/// Converts a retry outcome into a [`SendResult`].
fn from_outcome(outcome: SubmissionOutcome, strategy: Strategy, elapsed: Duration) -> SendResult {
    let attempts = u32::try_from(outcome.attempts().len()).unwrap_or(u32::MAX);
    let error_kind = outcome.error_kind();
    let confirmation_id = outcome.signature().map(str::to_owned);
    SendResult {
        success: confirmation_id.is_some(),
        channel_used: if confirmation_id.is_some() {
            Channel::Fast
        } else {
            Channel::None
        },
        confirmation_id,
        strategy,
        attempts,
        elapsed_ms: duration_to_ms_u64(elapsed),
        incentive_paid: 0,
        error_kind,
    }
}

/// Converts a race result into a [`SendResult`].
fn from_race(race: RaceResult, elapsed: Duration) -> SendResult {
    let attempts = u32::try_from(race.attempt_count()).unwrap_or(u32::MAX);
    SendResult {
        success: race.is_success(),
        confirmation_id: race.signature,
        channel_used: race.winner,
        strategy: Strategy::Race,
        attempts,
        elapsed_ms: duration_to_ms_u64(elapsed),
        incentive_paid: race.incentive_paid,
        error_kind: race.error_kind,
    }
}
