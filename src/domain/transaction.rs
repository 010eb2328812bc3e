use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-signer transaction counter (the ledger's account nonce).
pub type SequenceNumber = u64;

/// Printable account identifier of a signer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address(String);

impl Address {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ledger-assigned token correlating a dispatched transaction with its status stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxId(pub u64);

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

/// Unsigned call description produced by domain logic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub module: String,
    pub call: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

impl TransactionRequest {
    pub fn new(
        module: impl Into<String>,
        call: impl Into<String>,
        args: serde_json::Value,
    ) -> Self {
        Self {
            module: module.into(),
            call: call.into(),
            args,
        }
    }

    /// `balances.transfer` to `dest`.
    pub fn transfer(dest: &Address, amount: u64) -> Self {
        Self::new(
            "balances",
            "transfer",
            serde_json::json!({ "dest": dest.as_str(), "amount": amount }),
        )
    }

    /// `system.remark`, a call that always executes successfully.
    pub fn remark(text: &str) -> Self {
        Self::new("system", "remark", serde_json::json!({ "remark": text }))
    }
}

impl fmt::Display for TransactionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.module, self.call)
    }
}

/// A request bound to one sequence number and signed by its sender.
#[derive(Debug, Clone, PartialEq)]
pub struct SignedTransaction {
    pub signer: Address,
    pub sequence: SequenceNumber,
    pub bytes: Vec<u8>,
}

/// An event emitted by the ledger while executing a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEvent {
    pub section: String,
    pub method: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl LedgerEvent {
    pub fn new(
        section: impl Into<String>,
        method: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            section: section.into(),
            method: method.into(),
            data,
        }
    }
}

impl fmt::Display for LedgerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.section, self.method)?;
        if !self.data.is_null() {
            write!(f, " {}", self.data)?;
        }
        Ok(())
    }
}

/// Progress notification on a transaction's status stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusEvent {
    /// Pooled, waiting for an earlier sequence number.
    Future,
    /// Pooled and includable.
    Ready,
    InBlock { block: u64, events: Vec<LedgerEvent> },
    Retracted { block: u64 },
    Finalized { block: u64, events: Vec<LedgerEvent> },
    /// Evicted from the pool.
    Dropped,
    /// Replaced by another transaction with the same sequence number.
    Usurped,
    Invalid(String),
}

impl StatusEvent {
    pub fn name(&self) -> &'static str {
        match self {
            StatusEvent::Future => "future",
            StatusEvent::Ready => "ready",
            StatusEvent::InBlock { .. } => "in_block",
            StatusEvent::Retracted { .. } => "retracted",
            StatusEvent::Finalized { .. } => "finalized",
            StatusEvent::Dropped => "dropped",
            StatusEvent::Usurped => "usurped",
            StatusEvent::Invalid(_) => "invalid",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_request_args() {
        let dest = Address::new("bob");
        let request = TransactionRequest::transfer(&dest, 42);

        assert_eq!(request.to_string(), "balances.transfer");
        assert_eq!(request.args["dest"], "bob");
        assert_eq!(request.args["amount"], 42);
    }

    #[test]
    fn test_request_deserialization_defaults_args() {
        let request: TransactionRequest =
            serde_json::from_str(r#"{"module":"system","call":"remark"}"#).unwrap();
        assert!(request.args.is_null());
    }

    #[test]
    fn test_ledger_event_display() {
        let plain = LedgerEvent::new("system", "ExtrinsicSuccess", serde_json::Value::Null);
        assert_eq!(plain.to_string(), "system.ExtrinsicSuccess");

        let with_data = LedgerEvent::new(
            "system",
            "ExtrinsicFailed",
            serde_json::json!({ "error": "InsufficientBalance" }),
        );
        assert_eq!(
            with_data.to_string(),
            r#"system.ExtrinsicFailed {"error":"InsufficientBalance"}"#
        );
    }
}
