use crate::domain::transaction::{Address, TxId};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Nonce query failed: {0}")]
    QueryFailure(String),
    #[error("Dispatch failed: {0}")]
    DispatchFailure(String),
    #[error("Transaction {tx} not confirmed within {timeout:?}")]
    ConfirmationTimeout { tx: TxId, timeout: Duration },
    #[error("Sequence state for {0} is stale, resync required")]
    ResyncRequired(Address),
    #[error("Sequence numbers for {0} exhausted")]
    SequenceOverflow(Address),
    #[error("Scenario error: {0}")]
    Scenario(String),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
