//! Ledger module containing transaction processing and the orchestrator

pub mod core;
pub mod transaction;

pub use self::core::*;
pub use transaction::*;
