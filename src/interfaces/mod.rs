//! Scenario files in, run reports out.

pub mod csv;
pub mod scenario;
