use crate::domain::ports::{LedgerClientRef, Signer, SubmissionHandle};
use crate::domain::transaction::{SequenceNumber, TransactionRequest};
use crate::error::{EngineError, Result};
use tracing::{debug, warn};

/// Signs requests with an allocated sequence number and hands them to the ledger.
#[derive(Clone)]
pub struct TransactionSubmitter {
    ledger: LedgerClientRef,
}

impl TransactionSubmitter {
    pub fn new(ledger: LedgerClientRef) -> Self {
        Self { ledger }
    }

    /// Binds `request` to exactly `sequence`, dispatches it and returns the
    /// handle to its status stream.
    ///
    /// Signing errors and transport refusals are reported as
    /// `DispatchFailure`; ledger-level rejection only shows up later on the
    /// status stream.
    pub async fn submit(
        &self,
        request: &TransactionRequest,
        signer: &dyn Signer,
        sequence: SequenceNumber,
    ) -> Result<SubmissionHandle> {
        let signed = signer.sign(request, sequence).map_err(|e| match e {
            EngineError::DispatchFailure(_) => e,
            other => EngineError::DispatchFailure(format!("signing failed: {other}")),
        })?;

        if signed.sequence != sequence || &signed.signer != signer.address() {
            return Err(EngineError::DispatchFailure(format!(
                "signer produced {}#{}, expected {}#{}",
                signed.signer,
                signed.sequence,
                signer.address(),
                sequence
            )));
        }

        debug!(signer = %signer.address(), sequence, call = %request, "transaction signed");

        match self.ledger.dispatch(signed).await {
            Ok(handle) => {
                debug!(signer = %handle.signer, sequence, tx = %handle.tx, "transaction dispatched");
                Ok(handle)
            }
            Err(e) => {
                warn!(signer = %signer.address(), sequence, error = %e, "dispatch refused");
                Err(match e {
                    EngineError::DispatchFailure(_) => e,
                    other => EngineError::DispatchFailure(other.to_string()),
                })
            }
        }
    }
}
