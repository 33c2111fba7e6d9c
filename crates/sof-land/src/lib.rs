#![forbid(unsafe_code)]
#![cfg_attr(
    test,
    allow(
        clippy::arithmetic_side_effects,
        clippy::expect_used,
        clippy::indexing_slicing,
        clippy::missing_docs_in_private_items,
        clippy::panic,
        missing_docs
    )
)]

//! Transaction landing engine: endpoint health, blockhash leases, retries, and a
//! fast-versus-guaranteed submission race driven by a risk score.
//!
//! Start from [`ReliabilityEngine`]; the lower layers are public for hosts that want to drive
//! a single stage directly.

/// One submission attempt and confirmation polling.
pub mod attempt;
/// Transaction builder and builder-backed payload.
pub mod builder;
/// Engine configuration and environment loading.
pub mod config;
/// Strategy selection and the engine entry point.
pub mod engine;
/// Caller-facing failure classes.
pub mod error;
/// Endpoint health monitoring and selection.
pub mod health;
/// Validity window ownership.
pub mod lease;
/// Tracing subscriber setup.
pub mod logging;
/// Re-signable payload boundary.
pub mod payload;
/// Endpoint selector and fee/compute collaborator traits.
pub mod providers;
/// Fast-versus-guaranteed race.
pub mod race;
/// Sequential retry controller.
pub mod retry;
/// Ledger and inclusion-service transports.
pub mod rpc;
#[cfg(test)]
/// Scripted collaborators for unit tests.
mod test_support;

pub use attempt::{AttemptError, ConfirmationPolicy};
pub use builder::{BuilderPayload, TxBuilder};
pub use config::{ConfigError, EngineConfig};
pub use engine::{
    ReliabilityEngine, RiskThresholds, SendResult, Strategy, bump_priority_fee, choose_strategy,
};
pub use error::ErrorKind;
pub use health::{Endpoint, EndpointHealthMonitor, HealthConfig, HealthSample, HealthThresholds};
pub use lease::{BlockhashLeaseManager, LeaseError, ValidityWindow};
pub use payload::{Incentive, PayloadAdjustments, ResignablePayload, SignError, SignedPayload};
pub use providers::{
    ComputeBudgetSource, EndpointSelector, PriorityFeeSource, StaticComputeBudget,
    StaticEndpointSelector, StaticPriorityFee,
};
pub use race::{Channel, ChannelStatus, GuaranteedChannel, IncentivePolicy, RaceCoordinator, RaceResult};
pub use retry::{BackoffSchedule, RetryController, SubmissionAttempt, SubmissionOutcome};
pub use rpc::{
    Commitment, InclusionService, JsonRpcConnector, JsonRpcInclusionService, JsonRpcLedgerClient,
    LedgerClient, LedgerConnector, SignatureState, TransportError,
};
