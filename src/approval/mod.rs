//! Two-person (four-eyes) approval of sensitive transactions

pub mod state;
pub mod workflow;

pub use state::ApprovalStateMachine;
pub use workflow::{ApprovalWorkflow, DecisionOutcome};
