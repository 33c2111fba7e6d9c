//! Engine configuration: defaults, `SOF_LAND_*` environment loading, and normalization.

use std::{str::FromStr, time::Duration};

use solana_pubkey::Pubkey;
use thiserror::Error;

use crate::{
    attempt::ConfirmationPolicy,
    engine::RiskThresholds,
    health::{Endpoint, HealthConfig, HealthThresholds},
    lease::DEFAULT_REFRESH_THRESHOLD,
    race::IncentivePolicy,
    retry::BackoffSchedule,
    rpc::Commitment,
};

/// Configuration load failures.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum ConfigError {
    /// Variable value could not be parsed.
    #[error("invalid value `{value}` for {name}: {reason}")]
    InvalidValue {
        /// Variable name.
        name: &'static str,
        /// Raw value.
        value: String,
        /// What was expected.
        reason: &'static str,
    },
    /// One endpoint list entry could not be parsed.
    #[error("invalid endpoint entry `{entry}` in SOF_LAND_ENDPOINTS: {reason}")]
    InvalidEndpoint {
        /// Raw entry.
        entry: String,
        /// What was wrong.
        reason: &'static str,
    },
}

/// Every tunable of the landing engine.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// RPC endpoints to monitor.
    pub endpoints: Vec<Endpoint>,
    /// Probe timeout, ceilings, and round TTL.
    pub health: HealthConfig,
    /// Minimum remaining blocks for a window to be handed out.
    pub refresh_threshold: u64,
    /// Delays between retry attempts.
    pub backoff: BackoffSchedule,
    /// Attempts per retry-controller run.
    pub max_attempts: u32,
    /// Strategy boundaries.
    pub risk: RiskThresholds,
    /// Guaranteed-channel incentive bounds.
    pub incentive: IncentivePolicy,
    /// Account receiving the incentive transfer; the race is disabled without it.
    pub incentive_recipient: Option<Pubkey>,
    /// Hard deadline for one race.
    pub race_timeout: Duration,
    /// Confirmation polling.
    pub confirmation: ConfirmationPolicy,
    /// Commitment a signature must reach.
    pub commitment: Commitment,
    /// Priority fee used when the fee source has no answer.
    pub default_priority_fee: u64,
    /// Compute units used when the budget source has no answer.
    pub default_compute_units: u32,
    /// Bundle endpoint of the inclusion service.
    pub inclusion_url: Option<String>,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            health: HealthConfig::default(),
            refresh_threshold: DEFAULT_REFRESH_THRESHOLD,
            backoff: BackoffSchedule::default(),
            max_attempts: 4,
            risk: RiskThresholds::default(),
            incentive: IncentivePolicy::default(),
            incentive_recipient: None,
            race_timeout: Duration::from_secs(30),
            confirmation: ConfirmationPolicy::default(),
            commitment: Commitment::Confirmed,
            default_priority_fee: 10_000,
            default_compute_units: 200_000,
            inclusion_url: None,
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl EngineConfig {
    /// Loads configuration from `SOF_LAND_*` environment variables over the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] naming the first variable whose value cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads configuration through `lookup` instead of the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] naming the first variable whose value cannot be parsed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &'static str| {
            lookup(name)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
                .map(|value| (name, value))
        };
        let mut config = Self::default();

        if let Some((_, value)) = read("SOF_LAND_ENDPOINTS") {
            config.endpoints = parse_endpoints(&value)?;
        }
        if let Some(var) = read("SOF_LAND_PROBE_TIMEOUT_MS") {
            config.health.probe_timeout = parse_millis(var)?;
        }
        if let Some(var) = read("SOF_LAND_MAX_LATENCY_MS") {
            config.health.thresholds.max_latency = parse_millis(var)?;
        }
        if let Some(var) = read("SOF_LAND_MAX_SLOT_LAG") {
            config.health.thresholds.max_slot_lag = parse_number(var)?;
        }
        if let Some(var) = read("SOF_LAND_HEALTH_ROUND_TTL_MS") {
            config.health.round_ttl = parse_millis(var)?;
        }
        if let Some(var) = read("SOF_LAND_REFRESH_THRESHOLD") {
            config.refresh_threshold = parse_number(var)?;
        }
        if let Some((name, value)) = read("SOF_LAND_BACKOFF_MS") {
            let steps = value
                .split(',')
                .map(|step| parse_millis((name, step.trim().to_owned())))
                .collect::<Result<Vec<_>, _>>()?;
            config.backoff = BackoffSchedule::new(steps);
        }
        if let Some(var) = read("SOF_LAND_MAX_ATTEMPTS") {
            config.max_attempts = parse_number(var)?;
        }
        if let Some(var) = read("SOF_LAND_RISK_LOW") {
            config.risk.low = parse_risk(var)?;
        }
        if let Some(var) = read("SOF_LAND_RISK_HIGH") {
            config.risk.high = parse_risk(var)?;
        }
        if let Some(var) = read("SOF_LAND_INCENTIVE_MIN_LAMPORTS") {
            config.incentive.min_lamports = parse_number(var)?;
        }
        if let Some(var) = read("SOF_LAND_INCENTIVE_CAP_LAMPORTS") {
            config.incentive.cap_lamports = parse_number(var)?;
        }
        if let Some((name, value)) = read("SOF_LAND_INCENTIVE_RECIPIENT") {
            let recipient = Pubkey::from_str(&value).map_err(|_error| ConfigError::InvalidValue {
                name,
                value: value.clone(),
                reason: "expected a base58 public key",
            })?;
            config.incentive_recipient = Some(recipient);
        }
        if let Some(var) = read("SOF_LAND_RACE_TIMEOUT_MS") {
            config.race_timeout = parse_millis(var)?;
        }
        if let Some(var) = read("SOF_LAND_CONFIRM_POLL_MS") {
            config.confirmation.poll_interval = parse_millis(var)?;
        }
        if let Some(var) = read("SOF_LAND_CONFIRM_TIMEOUT_MS") {
            config.confirmation.timeout = parse_millis(var)?;
        }
        if let Some((name, value)) = read("SOF_LAND_COMMITMENT") {
            config.commitment =
                Commitment::parse(&value).ok_or_else(|| ConfigError::InvalidValue {
                    name,
                    value: value.clone(),
                    reason: "expected processed, confirmed, or finalized",
                })?;
        }
        if let Some(var) = read("SOF_LAND_PRIORITY_FEE") {
            config.default_priority_fee = parse_number(var)?;
        }
        if let Some(var) = read("SOF_LAND_COMPUTE_UNITS") {
            config.default_compute_units = parse_number(var)?;
        }
        if let Some((_, value)) = read("SOF_LAND_INCLUSION_URL") {
            config.inclusion_url = Some(value);
        }
        if let Some(var) = read("SOF_LAND_REQUEST_TIMEOUT_MS") {
            config.request_timeout = parse_millis(var)?;
        }
        Ok(config.normalized())
    }

    /// Returns a configuration with bounded minimums and consistent thresholds.
    #[must_use]
    pub fn normalized(self) -> Self {
        let floor = Duration::from_millis(1);
        Self {
            health: HealthConfig {
                probe_timeout: self.health.probe_timeout.max(floor),
                thresholds: self.health.thresholds,
                round_ttl: self.health.round_ttl,
            },
            max_attempts: self.max_attempts.max(1),
            risk: self.risk.normalized(),
            incentive: self.incentive.normalized(),
            confirmation: ConfirmationPolicy {
                poll_interval: self.confirmation.poll_interval.max(floor),
                timeout: self.confirmation.timeout,
            },
            request_timeout: self.request_timeout.max(floor),
            ..self
        }
    }

    /// Sets the monitored endpoints.
    #[must_use]
    pub fn with_endpoints(mut self, endpoints: Vec<Endpoint>) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Sets health-check tuning.
    #[must_use]
    pub const fn with_health(mut self, health: HealthConfig) -> Self {
        self.health = health;
        self
    }

    /// Sets health ceilings.
    #[must_use]
    pub const fn with_health_thresholds(mut self, thresholds: HealthThresholds) -> Self {
        self.health.thresholds = thresholds;
        self
    }

    /// Sets the lease refresh threshold.
    #[must_use]
    pub const fn with_refresh_threshold(mut self, blocks: u64) -> Self {
        self.refresh_threshold = blocks;
        self
    }

    /// Sets the retry backoff schedule.
    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffSchedule) -> Self {
        self.backoff = backoff;
        self
    }

    /// Sets attempts per retry run.
    #[must_use]
    pub const fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets strategy boundaries.
    #[must_use]
    pub const fn with_risk_thresholds(mut self, risk: RiskThresholds) -> Self {
        self.risk = risk;
        self
    }

    /// Sets incentive bounds.
    #[must_use]
    pub const fn with_incentive(mut self, incentive: IncentivePolicy) -> Self {
        self.incentive = incentive;
        self
    }

    /// Sets the incentive recipient.
    #[must_use]
    pub const fn with_incentive_recipient(mut self, recipient: Pubkey) -> Self {
        self.incentive_recipient = Some(recipient);
        self
    }

    /// Sets the race deadline.
    #[must_use]
    pub const fn with_race_timeout(mut self, timeout: Duration) -> Self {
        self.race_timeout = timeout;
        self
    }

    /// Sets confirmation polling.
    #[must_use]
    pub const fn with_confirmation(mut self, confirmation: ConfirmationPolicy) -> Self {
        self.confirmation = confirmation;
        self
    }

    /// Sets the inclusion service URL.
    #[must_use]
    pub fn with_inclusion_url(mut self, url: impl Into<String>) -> Self {
        self.inclusion_url = Some(url.into());
        self
    }
}

/// Parses `name=url[@priority],...`.
fn parse_endpoints(value: &str) -> Result<Vec<Endpoint>, ConfigError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(parse_endpoint)
        .collect()
}

/// Parses one `name=url[@priority]` entry.
fn parse_endpoint(entry: &str) -> Result<Endpoint, ConfigError> {
    let invalid = |reason| ConfigError::InvalidEndpoint {
        entry: entry.to_owned(),
        reason,
    };
    let (name, rest) = entry.split_once('=').ok_or_else(|| invalid("expected name=url"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(invalid("empty endpoint name"));
    }
    // Priority is the suffix after the last `@` only when it parses as a number.
    let (url, priority) = match rest.rsplit_once('@') {
        Some((url, priority))
            if !priority.is_empty() && priority.bytes().all(|byte| byte.is_ascii_digit()) =>
        {
            let priority = priority
                .parse::<u32>()
                .map_err(|_error| invalid("priority out of range"))?;
            (url.trim(), priority)
        }
        _ => (rest.trim(), 0),
    };
    if url.is_empty() {
        return Err(invalid("empty endpoint url"));
    }
    Ok(Endpoint::new(name, url).with_priority(priority))
}

/// Parses a non-negative integer.
fn parse_number<T: FromStr>((name, value): (&'static str, String)) -> Result<T, ConfigError> {
    value.parse::<T>().map_err(|_error| ConfigError::InvalidValue {
        name,
        value,
        reason: "expected a non-negative integer",
    })
}

/// Parses whole milliseconds.
fn parse_millis(var: (&'static str, String)) -> Result<Duration, ConfigError> {
    parse_number::<u64>(var).map(Duration::from_millis)
}

/// Parses a risk boundary in `[0, 1]`.
fn parse_risk((name, value): (&'static str, String)) -> Result<f64, ConfigError> {
    match value.parse::<f64>() {
        Ok(risk) if (0.0..=1.0).contains(&risk) => Ok(risk),
        _ => Err(ConfigError::InvalidValue {
            name,
            value,
            reason: "expected a number between 0 and 1",
        }),
    }
}
