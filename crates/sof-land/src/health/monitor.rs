//! Concurrent endpoint probing and freshness-first ranking.

use std::{
    cmp::Ordering,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use futures_util::future::join_all;
use tokio::time::{Instant, timeout};

use super::{Endpoint, HealthSample, HealthThresholds, Rejection, UNKNOWN_SLOT_LAG};
use crate::{providers::EndpointSelector, rpc::LedgerConnector};

/// Health-check tuning.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct HealthConfig {
    /// Budget for one probe; slower probes count as unreachable.
    pub probe_timeout: Duration,
    /// Latency and slot-lag ceilings.
    pub thresholds: HealthThresholds,
    /// How long a completed round answers [`EndpointHealthMonitor::best`] without re-probing.
    pub round_ttl: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(3),
            thresholds: HealthThresholds::default(),
            round_ttl: Duration::from_secs(1),
        }
    }
}

/// Outcome of one complete health round.
#[derive(Debug, Clone)]
pub struct HealthRound {
    /// When the last probe of the round settled.
    pub completed_at: Instant,
    /// Healthy endpoints, best first.
    pub ranked: Vec<(Endpoint, HealthSample)>,
    /// Excluded endpoints with the reason they were excluded.
    pub rejected: Vec<(Endpoint, HealthSample, Rejection)>,
}

/// Raw probe result before slot lag is known.
#[derive(Debug, Clone)]
struct ProbeObservation {
    /// Probed endpoint.
    endpoint: Endpoint,
    /// Slot reported, `None` on failure or timeout.
    slot: Option<u64>,
    /// Round-trip time, or the probe timeout on failure.
    latency: Duration,
}

/// Last round plus staleness marker.
#[derive(Debug, Default)]
struct RoundCache {
    /// Most recent completed round.
    round: Option<HealthRound>,
    /// Set after an endpoint-level failure so the next lookup re-probes.
    stale: bool,
}

/// Probes a fixed endpoint set and ranks it by freshness, then latency.
pub struct EndpointHealthMonitor {
    /// Configured endpoints, fixed for the monitor's lifetime.
    endpoints: Vec<Endpoint>,
    /// Connection factory used for probes.
    connector: Arc<dyn LedgerConnector>,
    /// Probe tuning.
    config: HealthConfig,
    /// Cached last round.
    cache: Mutex<RoundCache>,
}

impl EndpointHealthMonitor {
    /// Creates a monitor over a fixed endpoint set.
    #[must_use]
    pub fn new(
        endpoints: Vec<Endpoint>,
        connector: Arc<dyn LedgerConnector>,
        config: HealthConfig,
    ) -> Self {
        Self {
            endpoints,
            connector,
            config,
            cache: Mutex::new(RoundCache::default()),
        }
    }

    /// Returns the configured endpoints.
    #[must_use]
    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    /// Probes every endpoint concurrently and returns the healthy ones, best first.
    ///
    /// Never fails: probe errors and timeouts only exclude the affected endpoint.
    pub async fn check_all(&self) -> Vec<(Endpoint, HealthSample)> {
        let observations = join_all(self.endpoints.iter().map(|endpoint| self.probe(endpoint))).await;
        let round = rank_round(observations, &self.config.thresholds, Instant::now());
        for (endpoint, sample, rejection) in &round.rejected {
            tracing::debug!(
                endpoint = %endpoint.name,
                reason = rejection.as_str(),
                slot_lag = sample.slot_lag,
                latency_ms = duration_to_ms_u64(sample.latency),
                "endpoint excluded from health round"
            );
        }
        tracing::debug!(
            healthy = round.ranked.len(),
            rejected = round.rejected.len(),
            best = round.ranked.first().map_or("none", |(endpoint, _)| endpoint.name.as_str()),
            "health round complete"
        );
        let ranked = round.ranked.clone();
        if let Ok(mut cache) = self.cache.lock() {
            cache.round = Some(round);
            cache.stale = false;
        }
        ranked
    }

    /// Returns the best healthy endpoint, probing when the cached round is stale or expired.
    ///
    /// `None` means no endpoint is healthy right now; it is an expected outcome.
    pub async fn best(&self) -> Option<Endpoint> {
        if let Some(cached) = self.cached_best() {
            return Some(cached);
        }
        self.check_all()
            .await
            .into_iter()
            .next()
            .map(|(endpoint, _)| endpoint)
    }

    /// Forces the next [`Self::best`] call to run a fresh round.
    pub fn mark_stale(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.stale = true;
        }
    }

    /// Returns the last completed round, including rejected endpoints.
    #[must_use]
    pub fn last_round(&self) -> Option<HealthRound> {
        self.cache.lock().ok().and_then(|cache| cache.round.clone())
    }

    /// Returns the cached best endpoint when the last round is still usable.
    ///
    /// A round without survivors is never reused, so "nothing healthy" is always re-checked.
    fn cached_best(&self) -> Option<Endpoint> {
        let cache = self.cache.lock().ok()?;
        if cache.stale {
            return None;
        }
        let round = cache.round.as_ref()?;
        if round.completed_at.elapsed() >= self.config.round_ttl {
            return None;
        }
        round.ranked.first().map(|(endpoint, _)| endpoint.clone())
    }

    /// Probes one endpoint's slot under the probe timeout.
    async fn probe(&self, endpoint: &Endpoint) -> ProbeObservation {
        let started_at = Instant::now();
        let unreachable = ProbeObservation {
            endpoint: endpoint.clone(),
            slot: None,
            latency: self.config.probe_timeout,
        };
        let client = match self.connector.connect(endpoint) {
            Ok(client) => client,
            Err(error) => {
                tracing::warn!(endpoint = %endpoint.name, error = %error, "endpoint connect failed");
                return unreachable;
            }
        };
        match timeout(self.config.probe_timeout, client.get_slot()).await {
            Ok(Ok(slot)) => ProbeObservation {
                endpoint: endpoint.clone(),
                slot: Some(slot),
                latency: started_at.elapsed(),
            },
            Ok(Err(error)) => {
                tracing::warn!(endpoint = %endpoint.name, error = %error, "endpoint probe failed");
                unreachable
            }
            Err(_elapsed) => {
                tracing::warn!(
                    endpoint = %endpoint.name,
                    timeout_ms = duration_to_ms_u64(self.config.probe_timeout),
                    "endpoint probe timed out"
                );
                unreachable
            }
        }
    }
}

#[async_trait]
impl EndpointSelector for EndpointHealthMonitor {
    async fn select(&self) -> Option<Endpoint> {
        self.best().await
    }

    fn report_failure(&self, endpoint: &Endpoint) {
        tracing::debug!(endpoint = %endpoint.name, "endpoint failure reported; next lookup re-probes");
        self.mark_stale();
    }
}

/// Computes slot lag for every observation and splits the round into ranked and rejected sets.
fn rank_round(
    observations: Vec<ProbeObservation>,
    thresholds: &HealthThresholds,
    completed_at: Instant,
) -> HealthRound {
    let max_slot = observations
        .iter()
        .filter_map(|observation| observation.slot)
        .max();
    let mut ranked = Vec::with_capacity(observations.len());
    let mut rejected = Vec::new();
    for observation in observations {
        let slot_lag = match (observation.slot, max_slot) {
            (Some(slot), Some(max_slot)) => max_slot.saturating_sub(slot),
            _ => UNKNOWN_SLOT_LAG,
        };
        let mut sample = HealthSample {
            reachable: observation.slot.is_some(),
            latency: observation.latency,
            slot: observation.slot,
            slot_lag,
            healthy: false,
        };
        match sample.rejection(thresholds) {
            Some(rejection) => rejected.push((observation.endpoint, sample, rejection)),
            None => {
                sample.healthy = true;
                ranked.push((observation.endpoint, sample));
            }
        }
    }
    ranked.sort_by(compare_ranked);
    HealthRound {
        completed_at,
        ranked,
        rejected,
    }
}

/// Freshness first, then latency, then static priority, then name.
fn compare_ranked(left: &(Endpoint, HealthSample), right: &(Endpoint, HealthSample)) -> Ordering {
    left.1
        .slot_lag
        .cmp(&right.1.slot_lag)
        .then_with(|| left.1.latency.cmp(&right.1.latency))
        .then_with(|| left.0.priority.cmp(&right.0.priority))
        .then_with(|| left.0.name.cmp(&right.0.name))
}

/// Converts a duration to whole milliseconds, saturating at `u64::MAX`.
pub(crate) fn duration_to_ms_u64(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
