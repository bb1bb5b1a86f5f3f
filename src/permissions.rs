//! Identities, capabilities and the permission policy
//!
//! The identity store is external. It hands the core a [`CapabilitySet`] for
//! every identity, and [`check_permission`] turns that into an allow or a
//! [`TrustError::Permission`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::types::{TrustError, TrustResult};

/// Authenticated (or not) caller of a core operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub username: String,
    pub authenticated: bool,
}

impl Identity {
    pub fn new(id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            authenticated: true,
        }
    }

    pub fn anonymous() -> Self {
        Self {
            id: String::new(),
            username: "anonymous".to_string(),
            authenticated: false,
        }
    }
}

/// Role of a user within the firm
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// No access profile. Every action is refused.
    #[default]
    Unassigned,
    Staff,
    /// Emergency override: passes every capability check
    Administrator,
    /// Runs the system but is kept away from client money
    SystemAdministrator,
}

/// Fine-grained permission granted to a user
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    ApproveTransactions,
    Reconcile,
    PrintChecks,
    ManageUsers,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::ApproveTransactions => "can_approve_transactions",
            Capability::Reconcile => "can_reconcile",
            Capability::PrintChecks => "can_print_checks",
            Capability::ManageUsers => "can_manage_users",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a user may do. The default grants no access at all; real staff
/// start from [`CapabilitySet::staff`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySet {
    pub role: Role,
    pub capabilities: BTreeSet<Capability>,
}

impl CapabilitySet {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            capabilities: BTreeSet::new(),
        }
    }

    pub fn staff() -> Self {
        Self::new(Role::Staff)
    }

    pub fn with(mut self, capability: Capability) -> Self {
        self.capabilities.insert(capability);
        self
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

/// Operation being authorized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    ApproveTransaction,
    RejectTransaction,
    Reconcile,
    PrintChecks,
    ManageUsers,
    RecordTransaction,
    RequestApproval,
    PostTransaction,
    DeleteTransaction,
    ViewFinancialData,
    OpenCase,
}

impl Action {
    /// Capability the action needs. `None` with [`Action::is_admin_only`]
    /// false means any authenticated user with financial access.
    pub fn required_capability(&self) -> Option<Capability> {
        match self {
            Action::ApproveTransaction | Action::RejectTransaction => {
                Some(Capability::ApproveTransactions)
            }
            Action::Reconcile => Some(Capability::Reconcile),
            Action::PrintChecks => Some(Capability::PrintChecks),
            Action::ManageUsers => Some(Capability::ManageUsers),
            Action::RecordTransaction
            | Action::RequestApproval
            | Action::PostTransaction
            | Action::DeleteTransaction
            | Action::ViewFinancialData
            | Action::OpenCase => None,
        }
    }

    pub fn is_admin_only(&self) -> bool {
        matches!(self, Action::DeleteTransaction)
    }

    pub fn touches_financial_data(&self) -> bool {
        !matches!(self, Action::ManageUsers)
    }
}

/// Decide whether `identity` holding `capabilities` may perform `action`.
///
/// Order of checks: authentication, an assigned role, the system-administrator
/// exclusion from financial data, the administrator override, then the
/// capability itself.
pub fn check_permission(
    identity: &Identity,
    capabilities: &CapabilitySet,
    action: Action,
    administrator_override: bool,
) -> TrustResult<()> {
    if !identity.authenticated {
        return Err(TrustError::Permission(
            "authentication required".to_string(),
        ));
    }

    if capabilities.role == Role::Unassigned {
        return Err(TrustError::Permission(format!(
            "'{}' has no access profile",
            identity.username
        )));
    }

    if capabilities.role == Role::SystemAdministrator && action.touches_financial_data() {
        return Err(TrustError::Permission(format!(
            "system administrator '{}' has no access to financial data",
            identity.username
        )));
    }

    if capabilities.role == Role::Administrator && administrator_override {
        return Ok(());
    }

    if action.is_admin_only() {
        return Err(TrustError::Permission(format!(
            "'{}' requires an administrator",
            identity.username
        )));
    }

    match action.required_capability() {
        Some(capability) if !capabilities.has(capability) => Err(TrustError::Permission(
            format!("'{}' lacks {}", identity.username, capability),
        )),
        _ => Ok(()),
    }
}
