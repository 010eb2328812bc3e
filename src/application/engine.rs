use super::resolver::resolve;
use super::sequence::SequenceAllocator;
use super::submitter::TransactionSubmitter;
use super::tracker::{ConfirmationTracker, TrackerConfig};
use crate::domain::outcome::{Expectation, Outcome, Verdict};
use crate::domain::ports::{LedgerClientRef, Signer, SubmissionHandle};
use crate::domain::transaction::{Address, SequenceNumber, TransactionRequest};
use crate::error::Result;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Engine settings, loadable from a JSON file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Confirmation budget used when the caller has none of its own.
    pub timeout_ms: u64,
    pub tracker: TrackerConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            tracker: TrackerConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Outcome of one entry of a batch, in request order.
pub type BatchResult = Vec<Result<Verdict>>;

/// Allocates, signs, dispatches, tracks and judges transactions.
///
/// Any result that leaves the signer's on-chain nonce uncertain (dispatch
/// failure, rejection, confirmation timeout) marks the signer stale; the
/// caller must `resync` before the next allocation for that signer.
pub struct SubmissionEngine {
    allocator: SequenceAllocator,
    submitter: TransactionSubmitter,
    tracker: ConfirmationTracker,
    config: EngineConfig,
}

impl SubmissionEngine {
    pub fn new(ledger: LedgerClientRef, config: EngineConfig) -> Self {
        Self {
            allocator: SequenceAllocator::new(ledger.clone()),
            submitter: TransactionSubmitter::new(ledger),
            tracker: ConfirmationTracker::new(config.tracker.clone()),
            config,
        }
    }

    pub fn allocator(&self) -> &SequenceAllocator {
        &self.allocator
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn default_timeout(&self) -> Duration {
        self.config.default_timeout()
    }

    /// Re-reads the signer's nonce from the ledger and clears a stale mark.
    pub async fn resync(&self, address: &Address) -> Result<SequenceNumber> {
        self.allocator.resync(address).await
    }

    /// Submits one transaction and waits for its verdict.
    pub async fn submit_and_confirm(
        &self,
        request: &TransactionRequest,
        signer: &dyn Signer,
        expectation: Expectation,
        timeout: Duration,
    ) -> Result<Verdict> {
        let sequence = self.allocator.next(signer.address()).await?;
        let handle = self.submitter.submit(request, signer, sequence).await;
        self.settle(signer.address(), handle, expectation, timeout)
            .await
    }

    /// Submits every request expecting success. See `submit_batch_expecting`.
    pub async fn submit_batch(
        &self,
        requests: &[TransactionRequest],
        signer: &dyn Signer,
        timeout: Duration,
    ) -> Result<BatchResult> {
        let items: Vec<_> = requests
            .iter()
            .cloned()
            .map(|request| (request, Expectation::Success))
            .collect();
        self.submit_batch_expecting(&items, signer, timeout).await
    }

    /// Reserves a block of sequence numbers, dispatches every request, and
    /// only then awaits the confirmations concurrently.
    ///
    /// Only the reservation can fail the whole call; every other error is
    /// reported at the position of the request it belongs to.
    pub async fn submit_batch_expecting(
        &self,
        items: &[(TransactionRequest, Expectation)],
        signer: &dyn Signer,
        timeout: Duration,
    ) -> Result<BatchResult> {
        let address = signer.address();
        let block = self
            .allocator
            .reserve_block(address, items.len() as u64)
            .await?;
        info!(signer = %address, start = block.start(), count = block.len(), "submitting batch");

        let handles = join_all(
            items
                .iter()
                .zip(block)
                .map(|((request, _), sequence)| self.submitter.submit(request, signer, sequence)),
        )
        .await;

        let verdicts = join_all(
            handles
                .into_iter()
                .zip(items)
                .map(|(handle, (_, expectation))| {
                    self.settle(address, handle, *expectation, timeout)
                }),
        )
        .await;

        Ok(verdicts)
    }

    async fn settle(
        &self,
        address: &Address,
        handle: Result<SubmissionHandle>,
        expectation: Expectation,
        timeout: Duration,
    ) -> Result<Verdict> {
        let handle = match handle {
            Ok(handle) => handle,
            Err(e) => {
                self.allocator.mark_stale(address).await;
                return Err(e);
            }
        };
        let sequence = handle.sequence;

        let outcome = match self.tracker.await_outcome(handle, timeout).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.allocator.mark_stale(address).await;
                return Err(e);
            }
        };

        if let Outcome::Rejected(_) = outcome {
            self.allocator.mark_stale(address).await;
        }

        let verdict = resolve(expectation, outcome);
        if !verdict.is_pass() {
            warn!(signer = %address, sequence, ?expectation, verdict = %verdict, "expectation not met");
        }
        Ok(verdict)
    }
}
