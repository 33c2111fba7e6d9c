//! Bounded, non-decreasing backoff between retry attempts.

use std::time::Duration;

/// Delays applied before the second, third, ... attempt; the last step repeats.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct BackoffSchedule {
    /// Non-decreasing steps.
    steps: Vec<Duration>,
}

impl Default for BackoffSchedule {
    fn default() -> Self {
        Self::new([100, 200, 400, 800].map(Duration::from_millis))
    }
}

impl BackoffSchedule {
    /// Creates a schedule; any step shorter than its predecessor is raised to it.
    #[must_use]
    pub fn new(steps: impl IntoIterator<Item = Duration>) -> Self {
        let mut floor = Duration::ZERO;
        let steps = steps
            .into_iter()
            .map(|step| {
                floor = floor.max(step);
                floor
            })
            .collect();
        Self { steps }
    }

    /// Returns the configured steps.
    #[must_use]
    pub fn steps(&self) -> &[Duration] {
        &self.steps
    }

    /// Delay before 1-based `attempt`; zero for the first attempt or an empty schedule.
    #[must_use]
    pub fn delay_before(&self, attempt: u32) -> Duration {
        let Some(index) = attempt.checked_sub(2) else {
            return Duration::ZERO;
        };
        let index = usize::try_from(index).unwrap_or(usize::MAX);
        self.steps
            .get(index)
            .or_else(|| self.steps.last())
            .copied()
            .unwrap_or(Duration::ZERO)
    }
}
