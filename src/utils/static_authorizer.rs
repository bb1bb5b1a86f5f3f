//! Fixed user-to-capability table for tests and single-office deployments

use std::collections::HashMap;

use crate::permissions::{CapabilitySet, Identity};
use crate::traits::Authorizer;

/// Authorizer backed by a fixed map from user id to capabilities
#[derive(Debug, Clone, Default)]
pub struct StaticAuthorizer {
    grants: HashMap<String, CapabilitySet>,
}

impl StaticAuthorizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the capabilities of a user
    pub fn grant(mut self, user_id: impl Into<String>, capabilities: CapabilitySet) -> Self {
        self.grants.insert(user_id.into(), capabilities);
        self
    }
}

impl Authorizer for StaticAuthorizer {
    fn capabilities(&self, identity: &Identity) -> CapabilitySet {
        // unknown users get no access profile
        self.grants.get(&identity.id).cloned().unwrap_or_default()
    }
}
