use crate::domain::outcome::{FailureMarker, Outcome, RejectReason};
use crate::domain::ports::SubmissionHandle;
use crate::domain::transaction::{LedgerEvent, StatusEvent};
use crate::error::{EngineError, Result};
use futures::FutureExt;
use futures::stream::{BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use tracing::{Instrument, debug, debug_span, info, warn};

/// How far a transaction must progress before its outcome is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Finality {
    /// Inclusion in a block is enough.
    InBlock,
    #[default]
    Finalized,
}

impl FromStr for Finality {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "in_block" | "in-block" | "inblock" => Ok(Finality::InBlock),
            "finalized" => Ok(Finality::Finalized),
            _ => Err(format!("unknown finality '{s}', expected in_block or finalized")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub failure_marker: FailureMarker,
    pub finality: Finality,
}

enum Step {
    Pending,
    Settled(Outcome),
    Rejected(RejectReason),
}

/// Follows a transaction's status stream to its terminal outcome.
#[derive(Debug, Clone, Default)]
pub struct ConfirmationTracker {
    config: TrackerConfig,
}

impl ConfirmationTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Consumes the handle and waits at most `timeout` for a terminal status.
    ///
    /// A timeout is an error rather than an outcome: the transaction may still
    /// be finalized later. Dropping the stream releases the subscription but
    /// does not retract the transaction.
    pub async fn await_outcome(
        &self,
        handle: SubmissionHandle,
        timeout: Duration,
    ) -> Result<Outcome> {
        let SubmissionHandle {
            tx,
            signer,
            sequence,
            mut status,
        } = handle;

        let span = debug_span!("confirmation", %tx, %signer, sequence);
        let tracking = self.track(&mut status).instrument(span);

        match tokio::time::timeout(timeout, tracking).await {
            Ok(outcome) => {
                info!(%signer, sequence, %tx, outcome = %outcome, "transaction settled");
                Ok(outcome)
            }
            Err(_) => {
                warn!(%signer, sequence, %tx, ?timeout, "no terminal status before timeout");
                Err(EngineError::ConfirmationTimeout { tx, timeout })
            }
        }
    }

    async fn track(&self, status: &mut BoxStream<'static, StatusEvent>) -> Outcome {
        while let Some(event) = status.next().await {
            debug!(status = event.name(), "status update");
            match self.step(event) {
                Step::Pending => {}
                Step::Settled(outcome) => return outcome,
                Step::Rejected(reason) => return self.settle_rejection(status, reason),
            }
        }
        Outcome::Rejected(RejectReason::StreamClosed)
    }

    /// A finalization already queued behind a rejection is authoritative and wins.
    fn settle_rejection(
        &self,
        status: &mut BoxStream<'static, StatusEvent>,
        reason: RejectReason,
    ) -> Outcome {
        while let Some(Some(event)) = status.next().now_or_never() {
            if let Step::Settled(outcome) = self.step(event) {
                debug!(superseded = %reason, "finalization observed alongside rejection");
                return outcome;
            }
        }
        Outcome::Rejected(reason)
    }

    fn step(&self, event: StatusEvent) -> Step {
        match event {
            StatusEvent::Future | StatusEvent::Ready | StatusEvent::Retracted { .. } => {
                Step::Pending
            }
            StatusEvent::InBlock { block, events } => match self.config.finality {
                Finality::InBlock => Step::Settled(self.classify(block, events)),
                Finality::Finalized => Step::Pending,
            },
            StatusEvent::Finalized { block, events } => {
                Step::Settled(self.classify(block, events))
            }
            StatusEvent::Dropped => Step::Rejected(RejectReason::Dropped),
            StatusEvent::Usurped => Step::Rejected(RejectReason::Usurped),
            StatusEvent::Invalid(reason) => Step::Rejected(RejectReason::Invalid(reason)),
        }
    }

    fn classify(&self, block: u64, events: Vec<LedgerEvent>) -> Outcome {
        match events
            .iter()
            .find(|event| self.config.failure_marker.matches(event))
        {
            Some(marker) => Outcome::ApplicationFailure {
                block,
                marker: marker.clone(),
            },
            None => Outcome::Success { block, events },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::transaction::{Address, TxId};
    use futures::stream;
    use serde_json::json;
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::fmt::MakeWriter;

    fn handle(events: Vec<StatusEvent>) -> SubmissionHandle {
        SubmissionHandle {
            tx: TxId(1),
            signer: Address::new("alice"),
            sequence: 0,
            status: stream::iter(events).boxed(),
        }
    }

    fn success_event() -> LedgerEvent {
        LedgerEvent::new("system", "ExtrinsicSuccess", serde_json::Value::Null)
    }

    fn failed_event() -> LedgerEvent {
        LedgerEvent::new(
            "system",
            "ExtrinsicFailed",
            json!({ "error": "InsufficientBalance" }),
        )
    }

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_finalized_without_marker_is_success() {
        let tracker = ConfirmationTracker::default();
        let outcome = tracker
            .await_outcome(
                handle(vec![
                    StatusEvent::Ready,
                    StatusEvent::InBlock {
                        block: 1,
                        events: vec![success_event()],
                    },
                    StatusEvent::Finalized {
                        block: 1,
                        events: vec![success_event()],
                    },
                ]),
                TIMEOUT,
            )
            .await
            .unwrap();

        assert_eq!(
            outcome,
            Outcome::Success {
                block: 1,
                events: vec![success_event()]
            }
        );
    }

    #[tokio::test]
    async fn test_finalized_with_marker_is_application_failure() {
        let tracker = ConfirmationTracker::default();
        let outcome = tracker
            .await_outcome(
                handle(vec![StatusEvent::Finalized {
                    block: 4,
                    events: vec![failed_event()],
                }]),
                TIMEOUT,
            )
            .await
            .unwrap();

        assert_eq!(
            outcome,
            Outcome::ApplicationFailure {
                block: 4,
                marker: failed_event()
            }
        );
    }

    #[tokio::test]
    async fn test_custom_failure_marker() {
        let tracker = ConfirmationTracker::new(TrackerConfig {
            failure_marker: FailureMarker::new("evm", "ExecutionReverted"),
            ..Default::default()
        });
        let reverted = LedgerEvent::new("evm", "ExecutionReverted", serde_json::Value::Null);

        // The default marker means nothing under this configuration
        let outcome = tracker
            .await_outcome(
                handle(vec![StatusEvent::Finalized {
                    block: 2,
                    events: vec![failed_event()],
                }]),
                TIMEOUT,
            )
            .await
            .unwrap();
        assert!(outcome.is_success());

        let outcome = tracker
            .await_outcome(
                handle(vec![StatusEvent::Finalized {
                    block: 3,
                    events: vec![success_event(), reverted.clone()],
                }]),
                TIMEOUT,
            )
            .await
            .unwrap();
        assert_eq!(
            outcome,
            Outcome::ApplicationFailure {
                block: 3,
                marker: reverted
            }
        );
    }

    #[tokio::test]
    async fn test_invalid_is_rejected() {
        let tracker = ConfirmationTracker::default();
        let outcome = tracker
            .await_outcome(
                handle(vec![StatusEvent::Invalid("stale".to_string())]),
                TIMEOUT,
            )
            .await
            .unwrap();

        assert_eq!(
            outcome,
            Outcome::Rejected(RejectReason::Invalid("stale".to_string()))
        );
    }

    #[tokio::test]
    async fn test_stream_closed_before_finalization_is_rejected() {
        let tracker = ConfirmationTracker::default();
        let outcome = tracker
            .await_outcome(
                handle(vec![
                    StatusEvent::Ready,
                    StatusEvent::InBlock {
                        block: 1,
                        events: vec![success_event()],
                    },
                ]),
                TIMEOUT,
            )
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::Rejected(RejectReason::StreamClosed));
    }

    #[tokio::test]
    async fn test_in_block_finality_settles_on_inclusion() {
        let tracker = ConfirmationTracker::new(TrackerConfig {
            finality: Finality::InBlock,
            ..Default::default()
        });
        let outcome = tracker
            .await_outcome(
                handle(vec![
                    StatusEvent::InBlock {
                        block: 9,
                        events: vec![failed_event()],
                    },
                    StatusEvent::Invalid("never read".to_string()),
                ]),
                TIMEOUT,
            )
            .await
            .unwrap();

        assert!(matches!(
            outcome,
            Outcome::ApplicationFailure { block: 9, .. }
        ));
    }

    #[tokio::test]
    async fn test_queued_finalization_beats_rejection() {
        let tracker = ConfirmationTracker::default();
        let outcome = tracker
            .await_outcome(
                handle(vec![
                    StatusEvent::Dropped,
                    StatusEvent::Finalized {
                        block: 6,
                        events: vec![success_event()],
                    },
                ]),
                TIMEOUT,
            )
            .await
            .unwrap();

        assert!(matches!(outcome, Outcome::Success { block: 6, .. }));
    }

    #[tokio::test]
    async fn test_first_terminal_status_wins() {
        let tracker = ConfirmationTracker::default();
        let outcome = tracker
            .await_outcome(
                handle(vec![
                    StatusEvent::Finalized {
                        block: 2,
                        events: vec![failed_event()],
                    },
                    StatusEvent::Finalized {
                        block: 3,
                        events: vec![success_event()],
                    },
                    StatusEvent::Invalid("late".to_string()),
                ]),
                TIMEOUT,
            )
            .await
            .unwrap();

        assert!(matches!(
            outcome,
            Outcome::ApplicationFailure { block: 2, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_stream_times_out() {
        let tracker = ConfirmationTracker::default();
        let silent = SubmissionHandle {
            tx: TxId(42),
            signer: Address::new("alice"),
            sequence: 0,
            status: stream::iter(vec![StatusEvent::Ready])
                .chain(stream::pending())
                .boxed(),
        };

        let result = tracker.await_outcome(silent, TIMEOUT).await;

        match result {
            Err(EngineError::ConfirmationTimeout { tx, timeout }) => {
                assert_eq!(tx, TxId(42));
                assert_eq!(timeout, TIMEOUT);
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[test]
    fn test_tracker_config_from_json() {
        let config: TrackerConfig = serde_json::from_str(
            r#"{"failure_marker":{"section":"evm","method":"ExecutionReverted"},"finality":"in_block"}"#,
        )
        .unwrap();
        assert_eq!(config.finality, Finality::InBlock);
        assert_eq!(config.failure_marker.to_string(), "evm.ExecutionReverted");

        let defaults: TrackerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(defaults, TrackerConfig::default());
    }

    #[tokio::test]
    async fn test_retracted_block_waits_for_later_finalization() {
        let tracker = ConfirmationTracker::default();
        let outcome = tracker
            .await_outcome(
                handle(vec![
                    StatusEvent::InBlock {
                        block: 1,
                        events: vec![success_event()],
                    },
                    StatusEvent::Retracted { block: 1 },
                    StatusEvent::InBlock {
                        block: 2,
                        events: vec![success_event()],
                    },
                    StatusEvent::Finalized {
                        block: 2,
                        events: vec![success_event()],
                    },
                ]),
                TIMEOUT,
            )
            .await
            .unwrap();

        assert_eq!(
            outcome,
            Outcome::Success {
                block: 2,
                events: vec![success_event()]
            }
        );
    }

    #[tokio::test]
    async fn test_usurped_is_rejected() {
        let tracker = ConfirmationTracker::default();
        let outcome = tracker
            .await_outcome(
                handle(vec![StatusEvent::Ready, StatusEvent::Usurped]),
                TIMEOUT,
            )
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::Rejected(RejectReason::Usurped));
    }

    #[tokio::test]
    async fn test_queued_finalization_beats_usurped_after_reorg() {
        let tracker = ConfirmationTracker::default();
        let outcome = tracker
            .await_outcome(
                handle(vec![
                    StatusEvent::InBlock {
                        block: 1,
                        events: vec![success_event()],
                    },
                    StatusEvent::Retracted { block: 1 },
                    StatusEvent::Usurped,
                    StatusEvent::Finalized {
                        block: 2,
                        events: vec![success_event()],
                    },
                ]),
                TIMEOUT,
            )
            .await
            .unwrap();

        assert_eq!(
            outcome,
            Outcome::Success {
                block: 2,
                events: vec![success_event()]
            }
        );
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Captured {
        type Writer = Captured;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[tokio::test]
    async fn test_status_updates_carry_transaction_fields() {
        let captured = Captured::default();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(captured.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let tracker = ConfirmationTracker::default();
        tracker
            .await_outcome(
                handle(vec![
                    StatusEvent::Ready,
                    StatusEvent::Finalized {
                        block: 1,
                        events: vec![success_event()],
                    },
                ]),
                TIMEOUT,
            )
            .await
            .unwrap();

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        let updates: Vec<_> = output
            .lines()
            .filter(|line| line.contains("status update"))
            .collect();
        assert_eq!(updates.len(), 2, "{output}");
        for line in updates {
            assert!(line.contains("tx=0x00000001"), "{line}");
            assert!(line.contains("signer=alice"), "{line}");
            assert!(line.contains("sequence=0"), "{line}");
        }
    }
}
