//! Endpoint identity, health samples, and ranking thresholds.

use std::time::Duration;

/// Slot-lag value used for endpoints whose slot could not be observed.
pub const UNKNOWN_SLOT_LAG: u64 = u64::MAX;

/// One configured RPC endpoint. Immutable after configuration load.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Endpoint {
    /// Operator-facing name used in logs and results.
    pub name: String,
    /// JSON-RPC URL.
    pub url: String,
    /// Static priority; lower values win ties after freshness and latency.
    pub priority: u32,
}

impl Endpoint {
    /// Creates an endpoint with default priority.
    #[must_use]
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            priority: 0,
        }
    }

    /// Sets the static priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }
}

/// Result of probing one endpoint in one health round. Superseded, never updated.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct HealthSample {
    /// Probe completed in time.
    pub reachable: bool,
    /// Probe round-trip time; the probe timeout when unreachable.
    pub latency: Duration,
    /// Slot reported by the endpoint.
    pub slot: Option<u64>,
    /// Distance behind the freshest reachable endpoint; [`UNKNOWN_SLOT_LAG`] when unreachable.
    pub slot_lag: u64,
    /// Reachable and within both ceilings.
    pub healthy: bool,
}

impl HealthSample {
    /// Returns the reason this sample was excluded, if any.
    #[must_use]
    pub fn rejection(&self, thresholds: &HealthThresholds) -> Option<Rejection> {
        if !self.reachable {
            Some(Rejection::Unreachable)
        } else if self.slot_lag > thresholds.max_slot_lag {
            Some(Rejection::StaleLedger)
        } else if self.latency > thresholds.max_latency {
            Some(Rejection::Slow)
        } else {
            None
        }
    }
}

/// Why an endpoint was excluded from a round.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Rejection {
    /// Probe failed or timed out.
    Unreachable,
    /// Slot lag above the ceiling.
    StaleLedger,
    /// Latency above the ceiling.
    Slow,
}

impl Rejection {
    /// Returns a stable label for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unreachable => "unreachable",
            Self::StaleLedger => "stale_ledger",
            Self::Slow => "slow",
        }
    }
}

/// Ceilings an endpoint must stay under to be considered healthy.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct HealthThresholds {
    /// Maximum accepted probe latency.
    pub max_latency: Duration,
    /// Maximum accepted slot lag.
    pub max_slot_lag: u64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            max_latency: Duration::from_millis(500),
            max_slot_lag: 10,
        }
    }
}
