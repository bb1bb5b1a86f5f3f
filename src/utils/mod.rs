//! Utility modules

pub mod memory_audit;
pub mod memory_storage;
pub mod static_authorizer;
pub mod validation;

pub use memory_audit::*;
pub use memory_storage::*;
pub use static_authorizer::*;
pub use validation::*;
