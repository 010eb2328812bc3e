use super::csv::report_writer::ReportRow;
use super::csv::scenario_reader::ScenarioStep;
use crate::application::engine::SubmissionEngine;
use crate::domain::outcome::Verdict;
use crate::domain::ports::Signer;
use crate::error::Result;
use crate::infrastructure::in_memory::DevSigner;
use std::collections::HashMap;
use std::time::Duration;
use tracing::info;

/// Drives scenario steps through a `SubmissionEngine` with dev signers.
///
/// Stale signers are resynchronized before their next step, which is what a
/// caller is expected to do after a rejection or timeout.
pub struct ScenarioRunner<'a> {
    engine: &'a SubmissionEngine,
    timeout: Duration,
    signers: HashMap<String, DevSigner>,
}

impl<'a> ScenarioRunner<'a> {
    pub fn new(engine: &'a SubmissionEngine, timeout: Duration) -> Self {
        Self {
            engine,
            timeout,
            signers: HashMap::new(),
        }
    }

    fn signer(&mut self, uri: &str) -> DevSigner {
        self.signers
            .entry(uri.to_string())
            .or_insert_with(|| DevSigner::from_uri(uri))
            .clone()
    }

    async fn prepare(&self, signer: &DevSigner) -> Result<()> {
        if self.engine.allocator().is_stale(signer.address()).await {
            let nonce = self.engine.resync(signer.address()).await?;
            info!(signer = %signer.address(), nonce, "resynchronized before next step");
        }
        Ok(())
    }

    /// Runs every step in order, awaiting each confirmation before the next.
    pub async fn run_sequential(&mut self, steps: &[ScenarioStep]) -> Vec<ReportRow> {
        let mut rows = Vec::with_capacity(steps.len());
        for step in steps {
            let signer = self.signer(&step.signer);
            let result = match self.prepare(&signer).await {
                Ok(()) => {
                    self.engine
                        .submit_and_confirm(&step.request, &signer, step.expectation, self.timeout)
                        .await
                }
                Err(e) => Err(e),
            };
            rows.push(report(step, &signer, result));
        }
        rows
    }

    /// Groups consecutive steps of one signer and submits each group as a
    /// batch, so a group's transactions are all dispatched before any
    /// confirmation is awaited.
    pub async fn run_concurrent(&mut self, steps: &[ScenarioStep]) -> Vec<ReportRow> {
        let mut rows = Vec::with_capacity(steps.len());
        for group in steps.chunk_by(|a, b| a.signer == b.signer) {
            let signer = self.signer(&group[0].signer);
            let items: Vec<_> = group
                .iter()
                .map(|step| (step.request.clone(), step.expectation))
                .collect();

            let results = match self.prepare(&signer).await {
                Ok(()) => {
                    self.engine
                        .submit_batch_expecting(&items, &signer, self.timeout)
                        .await
                }
                Err(e) => Err(e),
            };

            match results {
                Ok(results) => rows.extend(
                    group
                        .iter()
                        .zip(results)
                        .map(|(step, result)| report(step, &signer, result)),
                ),
                Err(e) => {
                    let message = e.to_string();
                    rows.extend(group.iter().map(|step| ReportRow {
                        row: step.row,
                        signer: signer.address().to_string(),
                        call: step.request.to_string(),
                        outcome: format!("error: {message}"),
                        verdict: "fail".to_string(),
                    }));
                }
            }
        }
        rows
    }
}

fn report(step: &ScenarioStep, signer: &DevSigner, result: Result<Verdict>) -> ReportRow {
    let (outcome, verdict) = match result {
        Ok(verdict) => (
            verdict.outcome().to_string(),
            if verdict.is_pass() { "pass" } else { "fail" },
        ),
        Err(e) => (format!("error: {e}"), "fail"),
    };
    ReportRow {
        row: step.row,
        signer: signer.address().to_string(),
        call: step.request.to_string(),
        outcome,
        verdict: verdict.to_string(),
    }
}
