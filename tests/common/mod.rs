#![allow(dead_code)]

use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;
use txconfirm::application::engine::{EngineConfig, SubmissionEngine};
use txconfirm::domain::ports::{LedgerClient, Signer};
use txconfirm::domain::transaction::TransactionRequest;
use txconfirm::infrastructure::in_memory::{DevSigner, InMemoryLedger, SealMode};

pub struct Harness {
    pub ledger: Arc<InMemoryLedger>,
    pub engine: SubmissionEngine,
}

pub fn harness(mode: SealMode) -> Harness {
    let ledger = Arc::new(InMemoryLedger::new(mode));
    let engine = SubmissionEngine::new(ledger.clone(), EngineConfig::default());
    Harness { ledger, engine }
}

/// Moves `signer`'s on-chain nonce forward by `count` remarks, bypassing any engine.
pub async fn advance_nonce(ledger: &InMemoryLedger, signer: &DevSigner, count: u64) {
    let start = ledger.nonce(signer.address()).await;
    for sequence in start..start + count {
        let signed = signer
            .sign(&TransactionRequest::remark("warmup"), sequence)
            .unwrap();
        ledger.dispatch(signed).await.unwrap();
    }
    ledger.seal().await;
}

pub fn write_scenario(rows: &[[&str; 6]]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    {
        let mut wtr = csv::Writer::from_writer(file.as_file_mut());
        wtr.write_record(["signer", "module", "call", "dest", "amount", "expect"])
            .unwrap();
        for row in rows {
            wtr.write_record(row).unwrap();
        }
        wtr.flush().unwrap();
    }
    file.flush().unwrap();
    file
}
