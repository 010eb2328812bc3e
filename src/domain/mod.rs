//! Domain types and the ports the engine talks to.

pub mod outcome;
pub mod ports;
pub mod transaction;
