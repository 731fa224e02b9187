//! Application layer: the order engine and its operations.
//!
//! `OrderEngine` is the one entry point. Every write goes through
//! `LedgerStore::atomic_update`, and every operation re-checks its preconditions
//! against the state it is about to overwrite.

pub mod commands;
pub mod engine;
pub mod ledger;
pub mod projection;
pub mod settlement;
pub mod verification;
