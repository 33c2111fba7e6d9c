//! Endpoint health monitoring and selection.

/// Probe fan-out, ranking, and round caching.
mod monitor;
/// Endpoint and sample types.
mod types;

pub(crate) use monitor::duration_to_ms_u64;
pub use monitor::{EndpointHealthMonitor, HealthConfig, HealthRound};
pub use types::{Endpoint, HealthSample, HealthThresholds, Rejection, UNKNOWN_SLOT_LAG};
