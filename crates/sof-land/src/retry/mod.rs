//! Sequential retry controller with window refresh and endpoint re-selection.

/// Backoff schedule between attempts.
mod backoff;
/// Retry loop.
mod controller;
/// Attempt records and outcomes.
mod types;

pub use backoff::BackoffSchedule;
pub use controller::RetryController;
pub use types::{AttemptOutcome, SubmissionAttempt, SubmissionOutcome};
