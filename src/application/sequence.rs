use crate::domain::ports::LedgerClientRef;
use crate::domain::transaction::{Address, SequenceNumber};
use crate::error::{EngineError, Result};
use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// A contiguous run of sequence numbers reserved for one signer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceBlock {
    start: SequenceNumber,
    count: u64,
}

impl SequenceBlock {
    pub fn start(&self) -> SequenceNumber {
        self.start
    }

    /// First number after the block. Blocks are only built when this fits.
    pub fn end(&self) -> SequenceNumber {
        self.start + self.count
    }

    pub fn len(&self) -> usize {
        self.count as usize
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn iter(&self) -> Range<SequenceNumber> {
        self.start..self.end()
    }
}

impl IntoIterator for SequenceBlock {
    type Item = SequenceNumber;
    type IntoIter = Range<SequenceNumber>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[derive(Debug, Default)]
struct SignerSequence {
    /// `None` until the first authoritative read.
    next: Option<SequenceNumber>,
    stale: bool,
}

/// Hands out gapless, duplicate-free sequence numbers per signer.
///
/// Each signer's counter sits behind its own async mutex, so concurrent
/// allocations for one signer are serialized while different signers never
/// wait on each other. The first allocation for a signer reads the ledger's
/// nonce; afterwards numbers are issued locally until `resync`.
pub struct SequenceAllocator {
    ledger: LedgerClientRef,
    signers: RwLock<HashMap<Address, Arc<Mutex<SignerSequence>>>>,
}

impl SequenceAllocator {
    pub fn new(ledger: LedgerClientRef) -> Self {
        Self {
            ledger,
            signers: RwLock::new(HashMap::new()),
        }
    }

    async fn slot(&self, address: &Address) -> Arc<Mutex<SignerSequence>> {
        if let Some(slot) = self.signers.read().await.get(address) {
            return slot.clone();
        }
        let mut signers = self.signers.write().await;
        signers.entry(address.clone()).or_default().clone()
    }

    /// Returns the next sequence number for `address`.
    pub async fn next(&self, address: &Address) -> Result<SequenceNumber> {
        Ok(self.reserve_block(address, 1).await?.start())
    }

    /// Atomically reserves `count` consecutive sequence numbers.
    ///
    /// Used for fan-out submissions: every task takes one number from the
    /// block and no task needs to wait for another's confirmation.
    pub async fn reserve_block(&self, address: &Address, count: u64) -> Result<SequenceBlock> {
        let slot = self.slot(address).await;
        let mut state = slot.lock().await;

        if state.stale {
            return Err(EngineError::ResyncRequired(address.clone()));
        }

        let start = match state.next {
            Some(next) => next,
            None => {
                let nonce = self.ledger.query_nonce(address).await?;
                debug!(signer = %address, nonce, "fetched initial nonce");
                nonce
            }
        };

        let end = start
            .checked_add(count)
            .ok_or_else(|| EngineError::SequenceOverflow(address.clone()))?;
        state.next = Some(end);
        debug!(signer = %address, start, count, "reserved sequence numbers");
        Ok(SequenceBlock { start, count })
    }

    /// Re-reads the authoritative nonce and resets local state.
    ///
    /// On a failed query the previous state, including any stale mark, is kept.
    pub async fn resync(&self, address: &Address) -> Result<SequenceNumber> {
        let slot = self.slot(address).await;
        let mut state = slot.lock().await;

        let nonce = self.ledger.query_nonce(address).await?;
        if let Some(local) = state.next
            && local != nonce
        {
            info!(signer = %address, local, ledger = nonce, "sequence resynchronized");
        }
        state.next = Some(nonce);
        state.stale = false;
        Ok(nonce)
    }

    /// Blocks further allocation for `address` until the next `resync`.
    pub async fn mark_stale(&self, address: &Address) {
        let slot = self.slot(address).await;
        let mut state = slot.lock().await;
        if !state.stale {
            warn!(signer = %address, "sequence state marked stale");
        }
        state.stale = true;
    }

    async fn existing(&self, address: &Address) -> Option<Arc<Mutex<SignerSequence>>> {
        self.signers.read().await.get(address).cloned()
    }

    /// Next number that would be handed out, if known.
    pub async fn peek(&self, address: &Address) -> Option<SequenceNumber> {
        let slot = self.existing(address).await?;
        let state = slot.lock().await;
        state.next
    }

    pub async fn is_stale(&self, address: &Address) -> bool {
        match self.existing(address).await {
            Some(slot) => slot.lock().await.stale,
            None => false,
        }
    }

    /// Number of signers with local state.
    pub async fn tracked(&self) -> usize {
        self.signers.read().await.len()
    }
}
