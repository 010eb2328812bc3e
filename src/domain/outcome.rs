use super::transaction::LedgerEvent;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifies the ledger event that records an application-level failure
/// of an otherwise included transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureMarker {
    pub section: String,
    pub method: String,
}

impl FailureMarker {
    pub fn new(section: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            section: section.into(),
            method: method.into(),
        }
    }

    pub fn matches(&self, event: &LedgerEvent) -> bool {
        event.section == self.section && event.method == self.method
    }
}

impl Default for FailureMarker {
    fn default() -> Self {
        Self::new("system", "ExtrinsicFailed")
    }
}

impl fmt::Display for FailureMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.section, self.method)
    }
}

impl FromStr for FailureMarker {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('.') {
            Some((section, method)) if !section.is_empty() && !method.is_empty() => {
                Ok(Self::new(section, method))
            }
            _ => Err(format!("expected <section>.<method>, got '{s}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RejectReason {
    Invalid(String),
    Dropped,
    Usurped,
    /// The status stream ended before any terminal event.
    StreamClosed,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::Invalid(reason) => write!(f, "invalid: {reason}"),
            RejectReason::Dropped => f.write_str("dropped"),
            RejectReason::Usurped => f.write_str("usurped"),
            RejectReason::StreamClosed => f.write_str("status stream closed"),
        }
    }
}

/// Terminal classification of a submitted transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success { block: u64, events: Vec<LedgerEvent> },
    ApplicationFailure { block: u64, marker: LedgerEvent },
    Rejected(RejectReason),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Success { .. } => "success",
            Outcome::ApplicationFailure { .. } => "application_failure",
            Outcome::Rejected(_) => "rejected",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success { block, .. } => write!(f, "success in block #{block}"),
            Outcome::ApplicationFailure { block, marker } => {
                write!(f, "application failure in block #{block}: {marker}")
            }
            Outcome::Rejected(reason) => write!(f, "rejected ({reason})"),
        }
    }
}

/// What the caller declares about a transaction before submitting it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Expectation {
    #[default]
    #[serde(alias = "expect_success")]
    Success,
    #[serde(alias = "expect_failure")]
    Failure,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Pass(Outcome),
    Fail(Outcome),
}

impl Verdict {
    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass(_))
    }

    pub fn outcome(&self) -> &Outcome {
        match self {
            Verdict::Pass(outcome) | Verdict::Fail(outcome) => outcome,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Pass(outcome) => write!(f, "pass ({outcome})"),
            Verdict::Fail(outcome @ Outcome::Success { .. }) => {
                write!(f, "fail: succeeded unexpectedly ({outcome})")
            }
            Verdict::Fail(outcome) => write!(f, "fail: {outcome}"),
        }
    }
}
