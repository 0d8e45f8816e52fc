//! SOLARB — Autonomous Solana round-trip arbitrage searcher.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod jupiter;
pub mod strategy;
pub mod assembler;
pub mod bundle;
pub mod anchor;
pub mod jito;
pub mod engine;
