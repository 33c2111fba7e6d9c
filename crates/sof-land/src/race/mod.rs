//! Fast-versus-guaranteed submission race.

/// Race loop and channel tasks.
mod coordinator;
/// Incentive sizing.
mod incentive;
/// Channel and result types.
mod types;

pub use coordinator::{GuaranteedChannel, RaceCoordinator};
pub use incentive::{IncentivePolicy, clamp_risk};
pub use types::{Channel, ChannelStatus, RaceResult};
