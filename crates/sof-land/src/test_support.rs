//! Scripted collaborators shared by unit tests.

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Arc, Mutex,
        atomic::{AtomicU32, AtomicU64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;

use crate::{
    health::Endpoint,
    lease::ValidityWindow,
    payload::{PayloadAdjustments, ResignablePayload, SignError, SignedPayload},
    rpc::{
        InclusionService, LatestBlockhash, LedgerClient, LedgerConnector, SignatureState,
        TransportError,
    },
};

/// Scripted ledger endpoint.
#[derive(Debug)]
pub(crate) struct MockLedger {
    /// `getSlot` answer.
    slot: Result<u64, TransportError>,
    /// Delay before answering `getSlot`.
    slot_delay: Duration,
    /// Current block height.
    block_height: AtomicU64,
    /// Blocks of validity attached to every fetched blockhash.
    validity_blocks: u64,
    /// Remaining `getBlockHeight` calls that fail.
    failing_block_heights: AtomicU32,
    /// Remaining `getLatestBlockhash` calls that fail.
    failing_blockhashes: AtomicU32,
    /// `getLatestBlockhash` calls, failed ones included.
    blockhash_calls: AtomicU64,
    /// Scripted send answers; once empty the signature is derived from the bytes.
    send_results: Mutex<VecDeque<Result<String, TransportError>>>,
    /// Delay before answering `sendTransaction`.
    send_delay: Duration,
    /// Every payload handed to `sendTransaction`.
    sent: Mutex<Vec<Vec<u8>>>,
    /// Scripted status answers, consumed in order.
    states: Mutex<VecDeque<SignatureState>>,
    /// Status for specific signatures, consulted before the script.
    states_by_signature: Mutex<HashMap<String, SignatureState>>,
    /// Status once the script is empty.
    default_state: SignatureState,
    /// `getSignatureStatuses` calls.
    status_calls: AtomicU64,
}

impl MockLedger {
    /// Healthy ledger at slot 1_000 and block height 1_000 with 150-block windows.
    pub(crate) fn new() -> Self {
        Self {
            slot: Ok(1_000),
            slot_delay: Duration::ZERO,
            block_height: AtomicU64::new(1_000),
            validity_blocks: 150,
            failing_block_heights: AtomicU32::new(0),
            failing_blockhashes: AtomicU32::new(0),
            blockhash_calls: AtomicU64::new(0),
            send_results: Mutex::new(VecDeque::new()),
            send_delay: Duration::ZERO,
            sent: Mutex::new(Vec::new()),
            states: Mutex::new(VecDeque::new()),
            states_by_signature: Mutex::new(HashMap::new()),
            default_state: SignatureState::Confirmed { slot: 1_000 },
            status_calls: AtomicU64::new(0),
        }
    }

    pub(crate) fn with_slot(mut self, slot: u64) -> Self {
        self.slot = Ok(slot);
        self
    }

    pub(crate) fn with_slot_error(mut self) -> Self {
        self.slot = Err(TransportError::Request {
            method: "getSlot",
            message: "connection refused".to_owned(),
        });
        self
    }

    pub(crate) fn with_slot_delay(mut self, delay: Duration) -> Self {
        self.slot_delay = delay;
        self
    }

    pub(crate) fn with_block_height(self, height: u64) -> Self {
        self.block_height.store(height, Ordering::Release);
        self
    }

    pub(crate) fn with_validity_blocks(mut self, blocks: u64) -> Self {
        self.validity_blocks = blocks;
        self
    }

    pub(crate) fn with_send_results(self, results: Vec<Result<String, TransportError>>) -> Self {
        if let Ok(mut queue) = self.send_results.lock() {
            queue.extend(results);
        }
        self
    }

    pub(crate) fn with_send_delay(mut self, delay: Duration) -> Self {
        self.send_delay = delay;
        self
    }

    pub(crate) fn with_signature_states(self, states: Vec<SignatureState>) -> Self {
        if let Ok(mut queue) = self.states.lock() {
            queue.extend(states);
        }
        self
    }

    pub(crate) fn with_state_for(self, signature: &str, state: SignatureState) -> Self {
        if let Ok(mut states) = self.states_by_signature.lock() {
            states.insert(signature.to_owned(), state);
        }
        self
    }

    pub(crate) fn with_default_state(mut self, state: SignatureState) -> Self {
        self.default_state = state;
        self
    }

    pub(crate) fn set_block_height(&self, height: u64) {
        self.block_height.store(height, Ordering::Release);
    }

    pub(crate) fn fail_next_block_heights(&self, count: u32) {
        self.failing_block_heights.store(count, Ordering::Release);
    }

    pub(crate) fn fail_next_blockhashes(&self, count: u32) {
        self.failing_blockhashes.store(count, Ordering::Release);
    }

    pub(crate) fn blockhash_calls(&self) -> u64 {
        self.blockhash_calls.load(Ordering::Acquire)
    }

    pub(crate) fn send_calls(&self) -> usize {
        self.sent.lock().map_or(0, |sent| sent.len())
    }

    pub(crate) fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }

    pub(crate) fn status_calls(&self) -> u64 {
        self.status_calls.load(Ordering::Acquire)
    }

    /// Decrements `counter` and returns true while scripted failures remain.
    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |left| left.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn get_slot(&self) -> Result<u64, TransportError> {
        if !self.slot_delay.is_zero() {
            tokio::time::sleep(self.slot_delay).await;
        }
        self.slot.clone()
    }

    async fn get_block_height(&self) -> Result<u64, TransportError> {
        if Self::take_failure(&self.failing_block_heights) {
            return Err(TransportError::Request {
                method: "getBlockHeight",
                message: "scripted failure".to_owned(),
            });
        }
        Ok(self.block_height.load(Ordering::Acquire))
    }

    async fn get_latest_blockhash(&self) -> Result<LatestBlockhash, TransportError> {
        let call = self.blockhash_calls.fetch_add(1, Ordering::AcqRel).saturating_add(1);
        if Self::take_failure(&self.failing_blockhashes) {
            return Err(TransportError::Request {
                method: "getLatestBlockhash",
                message: "scripted failure".to_owned(),
            });
        }
        let height = self.block_height.load(Ordering::Acquire);
        Ok(LatestBlockhash {
            blockhash: format!("hash-{call}"),
            last_valid_block_height: height.saturating_add(self.validity_blocks),
        })
    }

    async fn send_transaction(&self, tx_bytes: &[u8]) -> Result<String, TransportError> {
        if !self.send_delay.is_zero() {
            tokio::time::sleep(self.send_delay).await;
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(tx_bytes.to_vec());
        }
        let scripted = self
            .send_results
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front());
        scripted.unwrap_or_else(|| Ok(signature_of(tx_bytes)))
    }

    async fn signature_state(&self, signature: &str) -> Result<SignatureState, TransportError> {
        self.status_calls.fetch_add(1, Ordering::AcqRel);
        let pinned = self
            .states_by_signature
            .lock()
            .ok()
            .and_then(|states| states.get(signature).cloned());
        if let Some(state) = pinned {
            return Ok(state);
        }
        let scripted = self.states.lock().ok().and_then(|mut queue| queue.pop_front());
        Ok(scripted.unwrap_or_else(|| self.default_state.clone()))
    }
}

/// Signature [`ScriptedPayload`] assigns to `tx_bytes`.
pub(crate) fn signature_of(tx_bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(tx_bytes);
    match text.strip_prefix("tx:") {
        Some(rest) => format!("sig:{rest}"),
        None => "sig:opaque".to_owned(),
    }
}

/// Connector that resolves endpoint URLs to scripted ledgers.
#[derive(Debug, Clone, Default)]
pub(crate) struct MockCluster {
    /// Ledgers keyed by URL.
    ledgers: HashMap<String, Arc<MockLedger>>,
}

impl MockCluster {
    /// One ledger behind endpoint `mock-0`.
    pub(crate) fn single(ledger: Arc<MockLedger>) -> (Self, Vec<Endpoint>) {
        Self::new(vec![ledger])
    }

    /// Ledgers behind endpoints `mock-0`, `mock-1`, ...
    pub(crate) fn new(ledgers: Vec<Arc<MockLedger>>) -> (Self, Vec<Endpoint>) {
        let mut cluster = Self::default();
        let mut endpoints = Vec::with_capacity(ledgers.len());
        for (index, ledger) in ledgers.into_iter().enumerate() {
            let endpoint = Endpoint::new(format!("mock-{index}"), format!("mock://{index}"));
            cluster.ledgers.insert(endpoint.url.clone(), ledger);
            endpoints.push(endpoint);
        }
        (cluster, endpoints)
    }
}

impl LedgerConnector for MockCluster {
    fn connect(&self, endpoint: &Endpoint) -> Result<Arc<dyn LedgerClient>, TransportError> {
        match self.ledgers.get(&endpoint.url) {
            Some(ledger) => {
                let client: Arc<dyn LedgerClient> = ledger.clone();
                Ok(client)
            }
            None => Err(TransportError::Config {
                message: format!("unknown endpoint {}", endpoint.url),
            }),
        }
    }
}

/// Payload that encodes the window and incentive into readable bytes.
#[derive(Debug, Default)]
pub(crate) struct ScriptedPayload {
    /// Windows passed to `resign`, in call order.
    windows: Mutex<Vec<ValidityWindow>>,
    /// Adjustments passed to `resign`, in call order.
    adjustments: Mutex<Vec<PayloadAdjustments>>,
    /// Error returned by every `resign` call when set.
    failure: Option<SignError>,
}

impl ScriptedPayload {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn failing(error: SignError) -> Self {
        Self {
            failure: Some(error),
            ..Self::default()
        }
    }

    pub(crate) fn windows(&self) -> Vec<ValidityWindow> {
        self.windows.lock().map(|windows| windows.clone()).unwrap_or_default()
    }

    pub(crate) fn adjustments(&self) -> Vec<PayloadAdjustments> {
        self.adjustments
            .lock()
            .map(|adjustments| adjustments.clone())
            .unwrap_or_default()
    }
}

impl ResignablePayload for ScriptedPayload {
    fn resign(
        &self,
        window: &ValidityWindow,
        adjustments: &PayloadAdjustments,
    ) -> Result<SignedPayload, SignError> {
        if let Ok(mut windows) = self.windows.lock() {
            windows.push(window.clone());
        }
        if let Ok(mut recorded) = self.adjustments.lock() {
            recorded.push(*adjustments);
        }
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }
        let incentive = adjustments.incentive.map_or(0, |incentive| incentive.lamports);
        let bytes = format!("tx:{}:{incentive}", window.blockhash).into_bytes();
        let signature = signature_of(&bytes);
        Ok(SignedPayload { bytes, signature })
    }
}

/// Scripted inclusion service.
#[derive(Debug)]
pub(crate) struct MockInclusion {
    /// Answer to every bundle.
    result: Result<String, TransportError>,
    /// Delay before answering.
    delay: Duration,
    /// Bundles received.
    bundles: Mutex<Vec<Vec<Vec<u8>>>>,
}

impl MockInclusion {
    /// Service that accepts every bundle.
    pub(crate) fn accepting() -> Self {
        Self {
            result: Ok("bundle-1".to_owned()),
            delay: Duration::ZERO,
            bundles: Mutex::new(Vec::new()),
        }
    }

    /// Service that rejects every bundle.
    pub(crate) fn rejecting() -> Self {
        Self {
            result: Err(TransportError::Rpc {
                method: "sendBundle",
                code: -32602,
                message: "bundle tip below minimum".to_owned(),
            }),
            ..Self::accepting()
        }
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn bundles(&self) -> Vec<Vec<Vec<u8>>> {
        self.bundles.lock().map(|bundles| bundles.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl InclusionService for MockInclusion {
    async fn submit_bundle(&self, transactions: &[Vec<u8>]) -> Result<String, TransportError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Ok(mut bundles) = self.bundles.lock() {
            bundles.push(transactions.to_vec());
        }
        self.result.clone()
    }
}
