//! Worker pool — N isolated copies of the arbitrage loop.
//!
//! The supervisor broadcasts an immutable configuration snapshot to each
//! worker; workers never talk to each other and deliberately race one
//! another at the relay.

pub mod supervisor;
pub mod worker;
