use crate::domain::outcome::{Expectation, Outcome, Verdict};

/// Compares the declared expectation with the terminal outcome.
///
/// The outcome travels with the verdict either way, so a failed expectation
/// can report what the ledger actually did.
pub fn resolve(expectation: Expectation, outcome: Outcome) -> Verdict {
    match (expectation, outcome) {
        (Expectation::Success, outcome @ Outcome::Success { .. }) => Verdict::Pass(outcome),
        (
            Expectation::Success,
            outcome @ (Outcome::ApplicationFailure { .. } | Outcome::Rejected(_)),
        ) => Verdict::Fail(outcome),
        (
            Expectation::Failure,
            outcome @ (Outcome::ApplicationFailure { .. } | Outcome::Rejected(_)),
        ) => Verdict::Pass(outcome),
        (Expectation::Failure, outcome @ Outcome::Success { .. }) => Verdict::Fail(outcome),
    }
}
