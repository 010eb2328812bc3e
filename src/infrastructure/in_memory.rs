use crate::domain::ports::{LedgerClient, Signer, SubmissionHandle};
use crate::domain::transaction::{
    Address, LedgerEvent, SequenceNumber, SignedTransaction, StatusEvent, TransactionRequest,
    TxId,
};
use crate::error::{EngineError, Result};
use async_trait::async_trait;
use futures::StreamExt;
use futures::channel::mpsc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tracing::debug;

/// When the in-memory ledger produces blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SealMode {
    /// Seal a block on every dispatch, like a dev node with instant sealing.
    #[default]
    Instant,
    /// Seal only when `InMemoryLedger::seal` is called.
    Manual,
}

/// What `DevSigner` puts on the wire.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    signer: Address,
    sequence: SequenceNumber,
    request: TransactionRequest,
}

#[derive(Debug, Deserialize)]
struct TransferArgs {
    dest: Address,
    amount: u64,
}

#[derive(Debug, Clone)]
enum Call {
    Transfer { dest: Address, amount: u64 },
    Remark,
}

impl Call {
    fn decode(request: &TransactionRequest) -> std::result::Result<Self, String> {
        match (request.module.as_str(), request.call.as_str()) {
            ("balances", "transfer") => {
                let args: TransferArgs = serde_json::from_value(request.args.clone())
                    .map_err(|e| format!("bad transfer arguments: {e}"))?;
                Ok(Call::Transfer {
                    dest: args.dest,
                    amount: args.amount,
                })
            }
            ("system", "remark") => Ok(Call::Remark),
            _ => Err(format!("cannot lookup call {request}")),
        }
    }
}

struct Pooled {
    tx: TxId,
    call: Call,
    status: mpsc::UnboundedSender<StatusEvent>,
}

#[derive(Debug, Default)]
struct Account {
    nonce: SequenceNumber,
    balance: u128,
}

#[derive(Default)]
struct LedgerState {
    accounts: HashMap<Address, Account>,
    pool: BTreeMap<Address, BTreeMap<SequenceNumber, Pooled>>,
    next_tx: u64,
    block: u64,
    accepted: Vec<(Address, SequenceNumber)>,
}

impl LedgerState {
    fn nonce(&self, address: &Address) -> SequenceNumber {
        self.accounts.get(address).map_or(0, |a| a.nonce)
    }

    /// Includes every pooled transaction whose sequence number continues its
    /// sender's nonce. Returns the new block number, if anything was included.
    fn seal(&mut self) -> Option<u64> {
        let LedgerState {
            accounts,
            pool,
            block,
            accepted,
            ..
        } = self;

        let mut included = Vec::new();
        for (signer, pending) in pool.iter_mut() {
            loop {
                let nonce = accounts.get(signer).map_or(0, |a| a.nonce);
                let Some(tx) = pending.remove(&nonce) else {
                    break;
                };
                debug!(%signer, sequence = nonce, tx = %tx.tx, "including transaction");
                let events = execute(accounts, signer, &tx.call);
                accounts.entry(signer.clone()).or_default().nonce = nonce + 1;
                accepted.push((signer.clone(), nonce));
                included.push((tx, events));
            }
        }
        pool.retain(|_, pending| !pending.is_empty());

        if included.is_empty() {
            return None;
        }

        *block += 1;
        debug!(block = *block, transactions = included.len(), "block sealed");
        for (tx, events) in included {
            let _ = tx.status.unbounded_send(StatusEvent::InBlock {
                block: *block,
                events: events.clone(),
            });
            let _ = tx.status.unbounded_send(StatusEvent::Finalized {
                block: *block,
                events,
            });
        }
        Some(*block)
    }
}

fn execute(
    accounts: &mut HashMap<Address, Account>,
    signer: &Address,
    call: &Call,
) -> Vec<LedgerEvent> {
    let success = LedgerEvent::new("system", "ExtrinsicSuccess", serde_json::Value::Null);
    match call {
        Call::Transfer { dest, amount } => {
            let value = u128::from(*amount);
            let from = accounts.entry(signer.clone()).or_default();
            if from.balance < value {
                return vec![LedgerEvent::new(
                    "system",
                    "ExtrinsicFailed",
                    json!({ "error": "InsufficientBalance" }),
                )];
            }
            from.balance -= value;
            accounts.entry(dest.clone()).or_default().balance += value;
            vec![
                LedgerEvent::new(
                    "balances",
                    "Transfer",
                    json!({ "from": signer, "to": dest, "amount": amount }),
                ),
                success,
            ]
        }
        Call::Remark => vec![success],
    }
}

/// Development ledger with accounts, a transaction pool and block sealing.
///
/// Mirrors how a dev chain treats sequence numbers: a transaction whose
/// number is ahead of its sender's nonce waits in the pool until the gap is
/// filled, and stale or duplicate numbers are reported as invalid.
pub struct InMemoryLedger {
    seal_mode: SealMode,
    reachable: AtomicBool,
    state: Mutex<LedgerState>,
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new(SealMode::default())
    }
}

impl InMemoryLedger {
    pub fn new(seal_mode: SealMode) -> Self {
        Self {
            seal_mode,
            reachable: AtomicBool::new(true),
            state: Mutex::new(LedgerState::default()),
        }
    }

    /// Credits `amount` to `address`.
    pub async fn endow(&self, address: &Address, amount: u128) {
        let mut state = self.state.lock().await;
        state.accounts.entry(address.clone()).or_default().balance += amount;
    }

    pub async fn balance(&self, address: &Address) -> u128 {
        let state = self.state.lock().await;
        state.accounts.get(address).map_or(0, |a| a.balance)
    }

    /// On-chain nonce, ignoring pooled transactions.
    pub async fn nonce(&self, address: &Address) -> SequenceNumber {
        self.state.lock().await.nonce(address)
    }

    /// Switches the submission endpoint on or off.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Seals a block from the pool. Returns its number if anything was included.
    pub async fn seal(&self) -> Option<u64> {
        self.state.lock().await.seal()
    }

    /// Evicts every pooled transaction of `address`, notifying each with `Dropped`.
    pub async fn drop_pending(&self, address: &Address) -> usize {
        let mut state = self.state.lock().await;
        let Some(pending) = state.pool.remove(address) else {
            return 0;
        };
        for tx in pending.values() {
            let _ = tx.status.unbounded_send(StatusEvent::Dropped);
        }
        pending.len()
    }

    pub async fn pending(&self, address: &Address) -> usize {
        let state = self.state.lock().await;
        state.pool.get(address).map_or(0, BTreeMap::len)
    }

    /// `(signer, sequence)` of every included transaction, in inclusion order.
    pub async fn accepted(&self) -> Vec<(Address, SequenceNumber)> {
        self.state.lock().await.accepted.clone()
    }

    fn check_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LedgerClient for InMemoryLedger {
    async fn query_nonce(&self, address: &Address) -> Result<SequenceNumber> {
        if !self.check_reachable() {
            return Err(EngineError::QueryFailure("endpoint unreachable".to_string()));
        }
        Ok(self.nonce(address).await)
    }

    async fn dispatch(&self, signed: SignedTransaction) -> Result<SubmissionHandle> {
        if !self.check_reachable() {
            return Err(EngineError::DispatchFailure("endpoint unreachable".to_string()));
        }

        let envelope: Envelope = serde_json::from_slice(&signed.bytes)
            .map_err(|e| EngineError::DispatchFailure(format!("malformed payload: {e}")))?;
        if envelope.signer != signed.signer || envelope.sequence != signed.sequence {
            return Err(EngineError::DispatchFailure(
                "payload does not match its signer or sequence".to_string(),
            ));
        }

        let (sender, receiver) = mpsc::unbounded();
        let mut state = self.state.lock().await;
        let tx = TxId(state.next_tx);
        state.next_tx += 1;

        let handle = SubmissionHandle {
            tx,
            signer: signed.signer.clone(),
            sequence: signed.sequence,
            status: receiver.boxed(),
        };

        let nonce = state.nonce(&signed.signer);
        let invalid = match Call::decode(&envelope.request) {
            Err(reason) => Some(reason),
            Ok(_) if signed.sequence < nonce => Some(format!(
                "stale sequence {}, account nonce is {nonce}",
                signed.sequence
            )),
            Ok(_)
                if state
                    .pool
                    .get(&signed.signer)
                    .is_some_and(|p| p.contains_key(&signed.sequence)) =>
            {
                Some(format!("sequence {} already pooled", signed.sequence))
            }
            Ok(call) => {
                let pending = state.pool.entry(signed.signer.clone()).or_default();
                let ready = (nonce..signed.sequence).all(|n| pending.contains_key(&n));
                let _ = sender.unbounded_send(if ready {
                    StatusEvent::Ready
                } else {
                    StatusEvent::Future
                });
                pending.insert(
                    signed.sequence,
                    Pooled {
                        tx,
                        call,
                        status: sender.clone(),
                    },
                );
                None
            }
        };

        if let Some(reason) = invalid {
            debug!(signer = %signed.signer, sequence = signed.sequence, %reason, "transaction invalid");
            let _ = sender.unbounded_send(StatusEvent::Invalid(reason));
        } else if self.seal_mode == SealMode::Instant {
            state.seal();
        }

        Ok(handle)
    }
}

/// Development signer standing in for the external keystore.
///
/// The address is derived from a dev URI (`//Alice` becomes `alice`) and the
/// payload is a JSON envelope binding the request to its sequence number.
#[derive(Debug, Clone)]
pub struct DevSigner {
    address: Address,
}

impl DevSigner {
    pub fn from_uri(uri: &str) -> Self {
        Self {
            address: dev_address(uri),
        }
    }
}

/// Address a `DevSigner` created from `uri` would have.
pub fn dev_address(uri: &str) -> Address {
    Address::new(uri.trim_start_matches('/').to_lowercase())
}

impl Signer for DevSigner {
    fn address(&self) -> &Address {
        &self.address
    }

    fn sign(
        &self,
        request: &TransactionRequest,
        sequence: SequenceNumber,
    ) -> Result<SignedTransaction> {
        let envelope = Envelope {
            signer: self.address.clone(),
            sequence,
            request: request.clone(),
        };
        Ok(SignedTransaction {
            signer: self.address.clone(),
            sequence,
            bytes: serde_json::to_vec(&envelope)?,
        })
    }
}
