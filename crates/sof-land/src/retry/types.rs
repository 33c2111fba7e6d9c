//! Attempt records and terminal outcomes of the retry controller.

use std::sync::Arc;

use crate::{attempt::AttemptError, error::ErrorKind, health::Endpoint, lease::ValidityWindow};

/// State of one attempt.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum AttemptOutcome {
    /// Still in flight.
    Pending,
    /// Confirmed at the target commitment.
    Success,
    /// Failed with the given class.
    Error(ErrorKind),
    /// Stopped locally before a result; a send may still land.
    Cancelled,
}

/// Record of one submission attempt.
#[derive(Debug, Clone)]
pub struct SubmissionAttempt {
    /// 1-based attempt number.
    pub number: u32,
    /// Endpoint used, `None` when nothing was healthy.
    pub endpoint: Option<Endpoint>,
    /// Window snapshot used, `None` when acquisition failed.
    pub window: Option<Arc<ValidityWindow>>,
    /// Attempt outcome.
    pub outcome: AttemptOutcome,
    /// Signature once the payload was signed.
    pub signature: Option<String>,
    /// Failure detail.
    pub detail: Option<String>,
}

impl SubmissionAttempt {
    /// Starts a pending record.
    #[must_use]
    pub const fn pending(number: u32) -> Self {
        Self {
            number,
            endpoint: None,
            window: None,
            outcome: AttemptOutcome::Pending,
            signature: None,
            detail: None,
        }
    }

    /// Record for a channel that was stopped before it reported anything.
    #[must_use]
    pub fn cancelled(number: u32) -> Self {
        Self {
            outcome: AttemptOutcome::Cancelled,
            detail: Some(AttemptError::Cancelled.to_string()),
            ..Self::pending(number)
        }
    }

    /// Settles the outcome from the attempt's result.
    pub(crate) fn finish(&mut self, result: &Result<String, AttemptError>) {
        match result {
            Ok(signature) => {
                self.outcome = AttemptOutcome::Success;
                self.signature = Some(signature.clone());
            }
            Err(AttemptError::Cancelled) => {
                self.outcome = AttemptOutcome::Cancelled;
                self.detail = Some(AttemptError::Cancelled.to_string());
            }
            Err(error) => {
                self.outcome = AttemptOutcome::Error(error.kind());
                self.detail = Some(error.to_string());
            }
        }
    }
}

/// Terminal result of one retry-controller invocation.
#[derive(Debug, Clone)]
pub enum SubmissionOutcome {
    /// One attempt confirmed.
    Confirmed {
        /// Confirmed signature.
        signature: String,
        /// Attempts in order; the last one succeeded.
        attempts: Vec<SubmissionAttempt>,
    },
    /// No attempt confirmed.
    Failed {
        /// Terminal class.
        kind: ErrorKind,
        /// Last error detail.
        detail: String,
        /// Attempts in order.
        attempts: Vec<SubmissionAttempt>,
    },
}

impl SubmissionOutcome {
    /// Returns true when an attempt confirmed.
    #[must_use]
    pub const fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed { .. })
    }

    /// Returns the confirmed signature.
    #[must_use]
    pub fn signature(&self) -> Option<&str> {
        match self {
            Self::Confirmed { signature, .. } => Some(signature),
            Self::Failed { .. } => None,
        }
    }

    /// Returns the terminal failure class.
    #[must_use]
    pub const fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Confirmed { .. } => None,
            Self::Failed { kind, .. } => Some(*kind),
        }
    }

    /// Returns the attempt records.
    #[must_use]
    pub fn attempts(&self) -> &[SubmissionAttempt] {
        match self {
            Self::Confirmed { attempts, .. } | Self::Failed { attempts, .. } => attempts,
        }
    }

    /// Consumes the outcome and returns its attempt records.
    #[must_use]
    pub fn into_attempts(self) -> Vec<SubmissionAttempt> {
        match self {
            Self::Confirmed { attempts, .. } | Self::Failed { attempts, .. } => attempts,
        }
    }
}
