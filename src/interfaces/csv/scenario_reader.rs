use crate::domain::outcome::Expectation;
use crate::domain::transaction::TransactionRequest;
use crate::error::{EngineError, Result};
use crate::infrastructure::in_memory::dev_address;
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize)]
struct ScenarioRow {
    signer: String,
    module: String,
    call: String,
    dest: Option<String>,
    amount: Option<u64>,
    expect: Expectation,
}

/// One transaction of a scenario, ready for the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioStep {
    /// 1-based data row number in the source file.
    pub row: usize,
    /// Dev URI of the sending account, e.g. `//Alice`.
    pub signer: String,
    pub request: TransactionRequest,
    pub expectation: Expectation,
}

impl ScenarioRow {
    fn into_step(self, row: usize) -> Result<ScenarioStep> {
        if self.signer.is_empty() {
            return Err(EngineError::Scenario(format!("row {row}: missing signer")));
        }

        let mut args = serde_json::Map::new();
        if let Some(dest) = self.dest.filter(|d| !d.is_empty()) {
            args.insert("dest".to_string(), dev_address(&dest).as_str().into());
        }
        if let Some(amount) = self.amount {
            args.insert("amount".to_string(), amount.into());
        }

        Ok(ScenarioStep {
            row,
            signer: self.signer,
            request: TransactionRequest::new(self.module, self.call, args.into()),
            expectation: self.expect,
        })
    }
}

/// Reads scenario steps from a CSV source with the columns
/// `signer, module, call, dest, amount, expect`.
///
/// Whitespace is trimmed and rows are deserialized lazily, so a malformed
/// row yields an error without stopping the rest of the scenario.
pub struct ScenarioReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> ScenarioReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    pub fn steps(self) -> impl Iterator<Item = Result<ScenarioStep>> {
        self.reader
            .into_deserialize::<ScenarioRow>()
            .enumerate()
            .map(|(i, result)| {
                result
                    .map_err(EngineError::from)
                    .and_then(|row| row.into_step(i + 1))
            })
    }
}
