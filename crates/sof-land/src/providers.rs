//! Provider traits and simple in-memory adapters used by the landing engine.

use async_trait::async_trait;

use crate::health::Endpoint;

/// Source of the endpoint a submission step should use.
#[async_trait]
pub trait EndpointSelector: Send + Sync {
    /// Returns the endpoint to use now, or `None` when nothing is healthy.
    async fn select(&self) -> Option<Endpoint>;

    /// Notes that `endpoint` just failed at the transport level.
    fn report_failure(&self, _endpoint: &Endpoint) {}
}

/// Source of the priority fee (micro-lamports per compute unit) to attach to a payload.
///
/// Implementations must answer promptly; `None` makes the engine use its configured fallback.
pub trait PriorityFeeSource: Send + Sync {
    /// Returns the current recommended priority fee.
    fn priority_fee(&self) -> Option<u64>;
}

/// Source of the compute-unit budget to attach to a payload.
///
/// Implementations must answer promptly; `None` makes the engine use its configured fallback.
pub trait ComputeBudgetSource: Send + Sync {
    /// Returns the predicted compute-unit budget.
    fn compute_units(&self) -> Option<u32>;
}

/// Selector that always returns the first of a fixed endpoint list.
#[derive(Debug, Clone, Default)]
pub struct StaticEndpointSelector {
    /// Ordered endpoints; the first one is always chosen.
    endpoints: Vec<Endpoint>,
}

impl StaticEndpointSelector {
    /// Creates a static selector.
    #[must_use]
    pub const fn new(endpoints: Vec<Endpoint>) -> Self {
        Self { endpoints }
    }
}

#[async_trait]
impl EndpointSelector for StaticEndpointSelector {
    async fn select(&self) -> Option<Endpoint> {
        self.endpoints.first().cloned()
    }
}

/// Fixed priority fee, for static configurations and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticPriorityFee {
    /// Optional fee value.
    value: Option<u64>,
}

impl StaticPriorityFee {
    /// Creates a provider with an optional static fee.
    #[must_use]
    pub const fn new(value: Option<u64>) -> Self {
        Self { value }
    }
}

impl PriorityFeeSource for StaticPriorityFee {
    fn priority_fee(&self) -> Option<u64> {
        self.value
    }
}

/// Fixed compute budget, for static configurations and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticComputeBudget {
    /// Optional compute-unit value.
    value: Option<u32>,
}

impl StaticComputeBudget {
    /// Creates a provider with an optional static compute budget.
    #[must_use]
    pub const fn new(value: Option<u32>) -> Self {
        Self { value }
    }
}

impl ComputeBudgetSource for StaticComputeBudget {
    fn compute_units(&self) -> Option<u32> {
        self.value
    }
}
