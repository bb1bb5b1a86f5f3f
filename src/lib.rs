//! # IOLTA Core
//!
//! Trust-account (IOLTA) core for law firms: matches bank-statement lines to
//! the firm's own records and gates sensitive transactions behind a
//! two-person approval.
//!
//! ## Features
//!
//! - **Reconciliation**: deterministic matching of bank lines to internal entries
//! - **Four-eyes approval**: pending → approved | rejected, no self-approval
//! - **Permissions**: capability checks with an administrator override and a
//!   system-administrator exclusion from financial data
//! - **Ledger posting**: approved transactions are posted and summed
//! - **Case numbers**: per-state sequences backed by the store
//! - **Storage abstraction**: database-agnostic design with trait-based storage
//!
//! ## Quick Start
//!
//! ```rust
//! use iolta_core::utils::{MemoryAuditLog, MemoryStorage, StaticAuthorizer};
//! use iolta_core::TrustLedger;
//!
//! let ledger = TrustLedger::new(
//!     MemoryStorage::new(),
//!     Box::new(StaticAuthorizer::new()),
//!     Box::new(MemoryAuditLog::new()),
//! );
//! assert!(ledger.config().reconciliation.fuzzy_matching);
//! ```

pub mod approval;
pub mod config;
pub mod ledger;
pub mod permissions;
pub mod reconciliation;
pub mod sequence;
pub mod traits;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use approval::{ApprovalStateMachine, ApprovalWorkflow};
pub use config::TrustConfig;
pub use ledger::*;
pub use permissions::{Action, Capability, CapabilitySet, Identity, Role};
pub use reconciliation::{MatchSnapshot, ReconciliationEngine, ReconciliationSummary};
pub use traits::*;
pub use types::*;

// Re-export transaction patterns for convenience
pub use ledger::transaction::patterns;
