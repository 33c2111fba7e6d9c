//! Race channel identifiers, statuses, and results.

use std::time::Duration;

use crate::{error::ErrorKind, retry::SubmissionAttempt};

/// Submission channel that confirmed a payload.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Channel {
    /// Plain send through the best healthy endpoint.
    Fast,
    /// Incentive bundle through the inclusion service.
    Guaranteed,
    /// Nothing confirmed.
    None,
}

impl Channel {
    /// Returns a stable lowercase label used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fast => "fast",
            Self::Guaranteed => "guaranteed",
            Self::None => "none",
        }
    }
}

/// Final state of one race channel.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ChannelStatus {
    /// Confirmed first.
    Success,
    /// Failed on its own.
    Failed(ErrorKind),
    /// Still pending at the race deadline.
    TimedOut,
    /// Stopped because the other channel won.
    Cancelled,
    /// Never started.
    NotScheduled,
}

/// Outcome of one race.
#[derive(Debug, Clone)]
pub struct RaceResult {
    /// Winning channel.
    pub winner: Channel,
    /// Time from race start to decision.
    pub elapsed: Duration,
    /// Lamports paid as incentive; zero unless the guaranteed channel won.
    pub incentive_paid: u64,
    /// Fast channel state.
    pub fast: ChannelStatus,
    /// Guaranteed channel state.
    pub guaranteed: ChannelStatus,
    /// Confirmed signature.
    pub signature: Option<String>,
    /// Failure class when nothing confirmed.
    pub error_kind: Option<ErrorKind>,
    /// Fast channel attempts, including one stopped because the other channel won.
    pub fast_attempts: Vec<SubmissionAttempt>,
    /// Guaranteed channel attempt, `None` when the channel was not scheduled.
    pub guaranteed_attempt: Option<SubmissionAttempt>,
}

impl RaceResult {
    /// Returns true when a channel confirmed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.winner != Channel::None
    }

    /// Attempts made across both channels.
    #[must_use]
    pub fn attempt_count(&self) -> usize {
        self.fast_attempts
            .len()
            .saturating_add(usize::from(self.guaranteed_attempt.is_some()))
    }
}
