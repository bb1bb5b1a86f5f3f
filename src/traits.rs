//! Traits for storage abstraction and the external collaborators

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::permissions::{CapabilitySet, Identity};
use crate::types::*;

/// Filter for transaction queries. `None` fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionFilter {
    pub origin: Option<Origin>,
    pub status: Option<TransactionStatus>,
    pub transaction_type: Option<TransactionType>,
    pub transaction_date: Option<NaiveDate>,
    pub reference_number: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl TransactionFilter {
    pub fn matches(&self, txn: &BankTransaction) -> bool {
        self.origin.is_none_or(|o| txn.origin == o)
            && self.status.is_none_or(|s| txn.status == s)
            && self
                .transaction_type
                .is_none_or(|t| txn.transaction_type == t)
            && self
                .transaction_date
                .is_none_or(|d| txn.transaction_date == d)
            && self
                .reference_number
                .as_ref()
                .is_none_or(|r| txn.reference_number.as_ref() == Some(r))
            && self.start_date.is_none_or(|d| txn.transaction_date >= d)
            && self.end_date.is_none_or(|d| txn.transaction_date <= d)
    }
}

/// Filter for approval request queries
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestFilter {
    pub decision: Option<Decision>,
    /// Only decided requests (approved or rejected)
    pub decided_only: bool,
    pub requested_by: Option<String>,
    pub transaction_id: Option<String>,
}

impl RequestFilter {
    pub fn matches(&self, request: &ApprovalRequest) -> bool {
        self.decision.is_none_or(|d| request.decision == d)
            && (!self.decided_only || request.decision.is_terminal())
            && self
                .requested_by
                .as_ref()
                .is_none_or(|u| &request.requested_by == u)
            && self
                .transaction_id
                .as_ref()
                .is_none_or(|t| &request.transaction_id == t)
    }
}

/// A transaction write guarded on the status the caller last read
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionWrite {
    pub transaction: BankTransaction,
    pub expected_status: TransactionStatus,
}

/// A write to the approval request table
#[derive(Debug, Clone, PartialEq)]
pub enum RequestWrite {
    /// New pending request. Rejected if the transaction already has one.
    Insert(ApprovalRequest),
    /// Decided request. Applied only while the stored request is still pending.
    Decide(ApprovalRequest),
}

/// Unit of work applied all-or-nothing by [`TrustStorage::commit`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    pub transactions: Vec<TransactionWrite>,
    pub requests: Vec<RequestWrite>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update_transaction(
        &mut self,
        transaction: BankTransaction,
        expected_status: TransactionStatus,
    ) -> &mut Self {
        self.transactions.push(TransactionWrite {
            transaction,
            expected_status,
        });
        self
    }

    pub fn insert_request(&mut self, request: ApprovalRequest) -> &mut Self {
        self.requests.push(RequestWrite::Insert(request));
        self
    }

    pub fn decide_request(&mut self, request: ApprovalRequest) -> &mut Self {
        self.requests.push(RequestWrite::Decide(request));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty() && self.requests.is_empty()
    }
}

/// Storage abstraction for the trust-accounting core
///
/// Implementations back onto any transactional store (PostgreSQL, SQLite,
/// in-memory, etc.). [`commit`](TrustStorage::commit) must apply a change set
/// atomically: either every write lands or none does.
#[async_trait]
pub trait TrustStorage: Send + Sync {
    /// Insert new transactions. Fails without inserting any if an id exists.
    async fn save_transactions(&mut self, transactions: &[BankTransaction]) -> TrustResult<()>;

    /// Get a transaction by ID
    async fn get_transaction(&self, transaction_id: &str) -> TrustResult<Option<BankTransaction>>;

    /// List transactions matching a filter, ordered by date then id
    async fn find_transactions(
        &self,
        filter: &TransactionFilter,
    ) -> TrustResult<Vec<BankTransaction>>;

    /// Remove a transaction (administrative action only)
    async fn delete_transaction(&mut self, transaction_id: &str) -> TrustResult<()>;

    /// Get an approval request by ID
    async fn get_request(&self, request_id: Uuid) -> TrustResult<Option<ApprovalRequest>>;

    /// List approval requests matching a filter, ordered by `requested_at` then id
    async fn find_requests(&self, filter: &RequestFilter) -> TrustResult<Vec<ApprovalRequest>>;

    /// Apply a change set atomically.
    ///
    /// - a transaction write whose stored status differs from
    ///   `expected_status` fails with [`TrustError::Persistence`]
    /// - inserting a second pending request for a transaction fails with
    ///   [`TrustError::Validation`]
    /// - deciding a request that is no longer pending fails with
    ///   [`TrustError::State`]
    async fn commit(&mut self, changes: ChangeSet) -> TrustResult<()>;

    /// Atomically increment and return the counter for a partition. The first
    /// value handed out is 1.
    async fn next_sequence(&mut self, partition: &str) -> TrustResult<u64>;
}

/// What an audit event records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    TransactionRecorded,
    StatementImported,
    TransactionMatched,
    TransactionUnmatched,
    ApprovalRequested,
    ApprovalApproved,
    ApprovalRejected,
    TransactionPosted,
    TransactionDeleted,
    CaseNumberAllocated,
}

/// One durable audit record: who did what to which record, and when
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    pub actor: String,
    pub at: NaiveDateTime,
    pub action: AuditAction,
    /// Identifier of the affected record
    pub subject: String,
    pub before: Option<serde_json::Value>,
    pub after: Option<serde_json::Value>,
}

impl AuditEvent {
    pub fn new(actor: &str, action: AuditAction, subject: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            actor: actor.to_string(),
            at: chrono::Utc::now().naive_utc(),
            action,
            subject: subject.into(),
            before: None,
            after: None,
        }
    }

    /// Attach before/after snapshots of the affected record
    pub fn with_snapshots<T: Serialize>(mut self, before: Option<&T>, after: Option<&T>) -> Self {
        self.before = before.and_then(|b| serde_json::to_value(b).ok());
        self.after = after.and_then(|a| serde_json::to_value(a).ok());
        self
    }
}

/// Durable audit trail collaborator
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: AuditEvent) -> TrustResult<()>;
}

/// Identity and role collaborator
///
/// Always returns a capability set. Unknown users get the default
/// [`Role::Unassigned`](crate::permissions::Role::Unassigned) set, which is
/// refused every action.
pub trait Authorizer: Send + Sync {
    fn capabilities(&self, identity: &Identity) -> CapabilitySet;
}

/// Trait for implementing custom transaction validation rules
pub trait TransactionValidator: Send + Sync {
    /// Validate a transaction before it is first saved
    fn validate_transaction(&self, transaction: &BankTransaction) -> TrustResult<()>;
}

/// Default transaction validator with the basic field rules
pub struct DefaultTransactionValidator;

impl TransactionValidator for DefaultTransactionValidator {
    fn validate_transaction(&self, transaction: &BankTransaction) -> TrustResult<()> {
        crate::utils::validation::validate_transaction_id(&transaction.id)?;
        crate::utils::validation::validate_amount(&transaction.amount)?;
        crate::utils::validation::validate_description(&transaction.description)?;
        Ok(())
    }
}
