//! Blockhash lease ownership: the single current validity window and its refresh policy.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::SystemTime,
};

use thiserror::Error;
use tokio::sync::Mutex;

use crate::{
    health::Endpoint,
    providers::EndpointSelector,
    rpc::{LedgerClient, LedgerConnector, TransportError},
};

/// Default minimum remaining block height for a window to be handed out.
pub const DEFAULT_REFRESH_THRESHOLD: u64 = 20;

/// Immutable snapshot of one validity window.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ValidityWindow {
    /// Base58 blockhash.
    pub blockhash: String,
    /// Last block height at which the blockhash is accepted.
    pub last_valid_block_height: u64,
    /// Block height observed right after the blockhash was fetched.
    pub block_height_at_fetch: u64,
    /// Endpoint the window was fetched from.
    pub source_endpoint: String,
    /// Wall-clock fetch time.
    pub fetched_at: SystemTime,
}

impl ValidityWindow {
    /// Blocks left when the window was fetched.
    #[must_use]
    pub const fn remaining_at_fetch(&self) -> u64 {
        self.last_valid_block_height
            .saturating_sub(self.block_height_at_fetch)
    }

    /// Blocks left at `block_height`.
    #[must_use]
    pub const fn remaining_at(&self, block_height: u64) -> u64 {
        self.last_valid_block_height.saturating_sub(block_height)
    }

    /// Returns true once `block_height` has passed the window.
    #[must_use]
    pub const fn is_expired_at(&self, block_height: u64) -> bool {
        block_height > self.last_valid_block_height
    }
}

/// Lease acquisition failures.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum LeaseError {
    /// No healthy endpoint was available to fetch or verify a window.
    #[error("no healthy endpoint available for blockhash lease")]
    NoHealthyEndpoint,
    /// Endpoint call failed while fetching or verifying a window.
    #[error("blockhash lease call to `{endpoint}` failed: {source}")]
    Transport {
        /// Endpoint name.
        endpoint: String,
        /// Underlying transport error.
        source: TransportError,
    },
    /// A freshly fetched window was already too close to expiry.
    #[error("fetched window has {remaining} blocks left, below threshold {threshold}")]
    InsufficientValidity {
        /// Blocks left at fetch.
        remaining: u64,
        /// Configured refresh threshold.
        threshold: u64,
    },
}

/// Exclusive owner of the current validity window.
///
/// Windows are handed out as shared immutable snapshots; only the manager replaces them.
pub struct BlockhashLeaseManager {
    /// Source of the endpoint used for refresh and verification.
    selector: Arc<dyn EndpointSelector>,
    /// Connection factory.
    connector: Arc<dyn LedgerConnector>,
    /// Minimum remaining blocks for a window to be handed out.
    refresh_threshold: u64,
    /// Current window, serialized so concurrent callers never refresh twice.
    current: Mutex<Option<Arc<ValidityWindow>>>,
    /// Set by [`Self::invalidate`] and by failed verifications.
    force_refresh: AtomicBool,
    /// Number of successful refreshes.
    refreshes: AtomicU64,
}

impl BlockhashLeaseManager {
    /// Creates a lease manager with no current window.
    #[must_use]
    pub fn new(
        selector: Arc<dyn EndpointSelector>,
        connector: Arc<dyn LedgerConnector>,
        refresh_threshold: u64,
    ) -> Self {
        Self {
            selector,
            connector,
            refresh_threshold,
            current: Mutex::new(None),
            force_refresh: AtomicBool::new(false),
            refreshes: AtomicU64::new(0),
        }
    }

    /// Returns a window with at least the refresh threshold of blocks left, refreshing if needed.
    ///
    /// Two calls that do not cross the threshold and are not separated by [`Self::invalidate`]
    /// return the identical window.
    ///
    /// # Errors
    ///
    /// Returns [`LeaseError`] when no endpoint can supply a window with enough validity left.
    pub async fn current(&self) -> Result<Arc<ValidityWindow>, LeaseError> {
        let mut current = self.current.lock().await;
        let forced = self.force_refresh.swap(false, Ordering::AcqRel);
        if !forced && let Some(window) = current.as_ref() {
            match self.remaining_blocks(window).await {
                Ok(remaining) if remaining >= self.refresh_threshold => {
                    return Ok(Arc::clone(window));
                }
                Ok(remaining) => {
                    tracing::debug!(
                        blockhash = %window.blockhash,
                        remaining,
                        threshold = self.refresh_threshold,
                        "validity window under refresh threshold"
                    );
                }
                Err(error) => {
                    tracing::warn!(
                        blockhash = %window.blockhash,
                        error = %error,
                        "could not verify validity window; refreshing"
                    );
                }
            }
        }

        match self.fetch_window().await {
            Ok(window) => {
                let window = Arc::new(window);
                *current = Some(Arc::clone(&window));
                let refreshes = self.refreshes.fetch_add(1, Ordering::AcqRel).saturating_add(1);
                tracing::debug!(
                    blockhash = %window.blockhash,
                    remaining = window.remaining_at_fetch(),
                    endpoint = %window.source_endpoint,
                    refreshes,
                    "validity window refreshed"
                );
                Ok(window)
            }
            Err(error) => {
                // The old window stays current but may not be reused without a refresh.
                self.force_refresh.store(true, Ordering::Release);
                Err(error)
            }
        }
    }

    /// Forces the next [`Self::current`] call to refresh regardless of apparent validity.
    pub fn invalidate(&self) {
        self.force_refresh.store(true, Ordering::Release);
    }

    /// Returns the number of successful refreshes so far.
    #[must_use]
    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::Acquire)
    }

    /// Returns the configured refresh threshold.
    #[must_use]
    pub const fn refresh_threshold(&self) -> u64 {
        self.refresh_threshold
    }

    /// Queries the current block height and returns the window's remaining blocks.
    async fn remaining_blocks(&self, window: &ValidityWindow) -> Result<u64, LeaseError> {
        let (endpoint, client) = self.open_best().await?;
        let height = client
            .get_block_height()
            .await
            .map_err(|source| LeaseError::Transport {
                endpoint: endpoint.name.clone(),
                source,
            })?;
        Ok(window.remaining_at(height))
    }

    /// Fetches a new window from the best endpoint and checks its remaining validity.
    async fn fetch_window(&self) -> Result<ValidityWindow, LeaseError> {
        let (endpoint, client) = self.open_best().await?;
        let transport = |source| LeaseError::Transport {
            endpoint: endpoint.name.clone(),
            source,
        };
        let latest = client.get_latest_blockhash().await.map_err(transport)?;
        let height = client.get_block_height().await.map_err(transport)?;
        let window = ValidityWindow {
            blockhash: latest.blockhash,
            last_valid_block_height: latest.last_valid_block_height,
            block_height_at_fetch: height,
            source_endpoint: endpoint.name.clone(),
            fetched_at: SystemTime::now(),
        };
        let remaining = window.remaining_at_fetch();
        if remaining < self.refresh_threshold {
            tracing::warn!(
                endpoint = %endpoint.name,
                remaining,
                threshold = self.refresh_threshold,
                "rejecting freshly fetched window below refresh threshold"
            );
            self.selector.report_failure(&endpoint);
            return Err(LeaseError::InsufficientValidity {
                remaining,
                threshold: self.refresh_threshold,
            });
        }
        Ok(window)
    }

    /// Selects the best endpoint and opens a connection to it.
    async fn open_best(&self) -> Result<(Endpoint, Arc<dyn LedgerClient>), LeaseError> {
        let endpoint = self
            .selector
            .select()
            .await
            .ok_or(LeaseError::NoHealthyEndpoint)?;
        let client = self
            .connector
            .connect(&endpoint)
            .map_err(|source| LeaseError::Transport {
                endpoint: endpoint.name.clone(),
                source,
            })?;
        Ok((endpoint, client))
    }
}
