//! Application layer: the submission and confirmation pipeline.
//!
//! `SubmissionEngine` composes the sequence allocator, the submitter, the
//! confirmation tracker and the expectation resolver. Per-signer state is
//! serialized with `tokio` mutexes; confirmations are awaited concurrently.

pub mod engine;
pub mod resolver;
pub mod sequence;
pub mod submitter;
pub mod tracker;
