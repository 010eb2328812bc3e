use super::transaction::{
    Address, SequenceNumber, SignedTransaction, StatusEvent, TransactionRequest, TxId,
};
use crate::error::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::fmt;
use std::sync::Arc;

/// Correlates a dispatched transaction with its status stream.
///
/// Consumed by the confirmation tracker, so a handle can resolve to at most
/// one terminal result.
pub struct SubmissionHandle {
    pub tx: TxId,
    pub signer: Address,
    pub sequence: SequenceNumber,
    pub status: BoxStream<'static, StatusEvent>,
}

impl fmt::Debug for SubmissionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubmissionHandle")
            .field("tx", &self.tx)
            .field("signer", &self.signer)
            .field("sequence", &self.sequence)
            .finish_non_exhaustive()
    }
}

/// Client side of the ledger node.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Authoritative next sequence number for `address`.
    async fn query_nonce(&self, address: &Address) -> Result<SequenceNumber>;
    /// Hands a signed transaction to the node and subscribes to its status.
    async fn dispatch(&self, tx: SignedTransaction) -> Result<SubmissionHandle>;
}

/// Signing capability backed by an external keystore.
pub trait Signer: Send + Sync {
    fn address(&self) -> &Address;
    fn sign(
        &self,
        request: &TransactionRequest,
        sequence: SequenceNumber,
    ) -> Result<SignedTransaction>;
}

pub type LedgerClientRef = Arc<dyn LedgerClient>;
pub type SignerRef = Arc<dyn Signer>;
