//! Two-person approval of transactions over a trust storage backend

use tracing::{info, warn};
use uuid::Uuid;

use crate::approval::state::ApprovalStateMachine;
use crate::traits::*;
use crate::types::*;

/// Result of a decision: the decided request and the released transaction
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionOutcome {
    pub request: ApprovalRequest,
    pub transaction_before: BankTransaction,
    pub transaction_after: BankTransaction,
}

/// Approval workflow manager
///
/// Capability checks belong to the caller. This type enforces the four-eyes
/// rule, the single-pending-request rule and the terminal-state guard.
pub struct ApprovalWorkflow<S: TrustStorage> {
    storage: S,
}

impl<S: TrustStorage> ApprovalWorkflow<S> {
    /// Create a new approval workflow
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Open a pending request for `transaction_id`, holding the transaction in
    /// `Pending` until it is decided.
    pub async fn create(
        &mut self,
        transaction_id: &str,
        requester: &str,
        note: Option<String>,
    ) -> TrustResult<(ApprovalRequest, BankTransaction)> {
        let transaction = self
            .storage
            .get_transaction(transaction_id)
            .await?
            .ok_or_else(|| TrustError::TransactionNotFound(transaction_id.to_string()))?;

        match transaction.status {
            TransactionStatus::Voided => {
                return Err(TrustError::Validation(format!(
                    "Transaction '{}' is voided",
                    transaction_id
                )))
            }
            TransactionStatus::Pending => {
                return Err(TrustError::Validation(format!(
                    "Transaction '{}' already has a pending approval request",
                    transaction_id
                )))
            }
            _ => {}
        }
        if transaction.is_posted() {
            return Err(TrustError::Validation(format!(
                "Transaction '{}' is already posted",
                transaction_id
            )));
        }

        let outstanding = self
            .storage
            .find_requests(&RequestFilter {
                decision: Some(Decision::Pending),
                transaction_id: Some(transaction_id.to_string()),
                ..Default::default()
            })
            .await?;
        if !outstanding.is_empty() {
            return Err(TrustError::Validation(format!(
                "Transaction '{}' already has a pending approval request",
                transaction_id
            )));
        }

        let request = ApprovalRequest::new(
            transaction_id.to_string(),
            requester.to_string(),
            transaction.status,
            note,
        );
        let mut held = transaction.clone();
        held.set_status(TransactionStatus::Pending);

        let mut changes = ChangeSet::new();
        changes
            .insert_request(request.clone())
            .update_transaction(held, transaction.status);
        self.storage.commit(changes).await?;

        info!(
            request_id = %request.id,
            transaction_id,
            requested_by = requester,
            "Approval requested"
        );
        Ok((request, transaction))
    }

    /// Approve a pending request. The transaction becomes postable.
    pub async fn approve(&mut self, request_id: Uuid, approver: &str) -> TrustResult<DecisionOutcome> {
        self.decide(request_id, approver, Decision::Approved).await
    }

    /// Reject a pending request. The transaction goes back to its prior state.
    pub async fn reject(&mut self, request_id: Uuid, approver: &str) -> TrustResult<DecisionOutcome> {
        self.decide(request_id, approver, Decision::Rejected).await
    }

    async fn decide(
        &mut self,
        request_id: Uuid,
        approver: &str,
        decision: Decision,
    ) -> TrustResult<DecisionOutcome> {
        let request = self.get_request_required(request_id).await?;
        let decided = ApprovalStateMachine::decide(
            &request,
            approver,
            decision,
            chrono::Utc::now().naive_utc(),
        )?;

        let transaction = self
            .storage
            .get_transaction(&request.transaction_id)
            .await?
            .ok_or_else(|| TrustError::TransactionNotFound(request.transaction_id.clone()))?;
        let mut released = transaction.clone();
        released.set_status(request.prior_status);

        // the store re-checks that the request is still pending
        let mut changes = ChangeSet::new();
        changes
            .decide_request(decided.clone())
            .update_transaction(released.clone(), transaction.status);
        if let Err(e) = self.storage.commit(changes).await {
            warn!(request_id = %request_id, approver, error = %e, "Approval decision not committed");
            return Err(e);
        }

        info!(
            request_id = %request_id,
            transaction_id = %request.transaction_id,
            approver,
            decision = %decision,
            "Approval decided"
        );
        Ok(DecisionOutcome {
            request: decided,
            transaction_before: transaction,
            transaction_after: released,
        })
    }

    /// Get a request by ID
    pub async fn get_request(&self, request_id: Uuid) -> TrustResult<Option<ApprovalRequest>> {
        self.storage.get_request(request_id).await
    }

    /// Get a request by ID, returning an error if not found
    pub async fn get_request_required(&self, request_id: Uuid) -> TrustResult<ApprovalRequest> {
        self.storage
            .get_request(request_id)
            .await?
            .ok_or(TrustError::RequestNotFound(request_id))
    }

    /// Pending requests, oldest first
    pub async fn list_pending(&self) -> TrustResult<Vec<ApprovalRequest>> {
        self.storage
            .find_requests(&RequestFilter {
                decision: Some(Decision::Pending),
                ..Default::default()
            })
            .await
    }

    /// Requests opened by a user, oldest first
    pub async fn list_by_requester(&self, requester: &str) -> TrustResult<Vec<ApprovalRequest>> {
        self.storage
            .find_requests(&RequestFilter {
                requested_by: Some(requester.to_string()),
                ..Default::default()
            })
            .await
    }

    /// Decided requests, oldest first
    pub async fn list_history(&self) -> TrustResult<Vec<ApprovalRequest>> {
        self.storage
            .find_requests(&RequestFilter {
                decided_only: true,
                ..Default::default()
            })
            .await
    }

    pub async fn pending_count(&self) -> TrustResult<usize> {
        Ok(self.list_pending().await?.len())
    }

    /// Most recent approved request for a transaction, if any
    pub async fn approved_request_for(
        &self,
        transaction_id: &str,
    ) -> TrustResult<Option<ApprovalRequest>> {
        Ok(self
            .storage
            .find_requests(&RequestFilter {
                decision: Some(Decision::Approved),
                transaction_id: Some(transaction_id.to_string()),
                ..Default::default()
            })
            .await?
            .pop())
    }

    /// Whether a transaction may be posted: approved and not yet posted
    pub async fn is_postable(&self, transaction_id: &str) -> TrustResult<bool> {
        let Some(transaction) = self.storage.get_transaction(transaction_id).await? else {
            return Ok(false);
        };
        if transaction.is_posted() || transaction.status == TransactionStatus::Pending {
            return Ok(false);
        }
        Ok(self.approved_request_for(transaction_id).await?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::memory_storage::MemoryStorage;
    use bigdecimal::BigDecimal;
    use chrono::NaiveDate;

    async fn workflow_with_txn() -> (ApprovalWorkflow<MemoryStorage>, MemoryStorage) {
        let mut storage = MemoryStorage::new();
        let txn = BankTransaction::new(
            "chk-1001".to_string(),
            Origin::Internal,
            NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
            BigDecimal::from(-2500),
            TransactionType::Withdrawal,
            Some("1001".to_string()),
            "Settlement disbursement".to_string(),
        );
        storage.save_transactions(&[txn]).await.unwrap();
        (ApprovalWorkflow::new(storage.clone()), storage)
    }

    #[tokio::test]
    async fn test_create_holds_transaction() {
        let (mut workflow, storage) = workflow_with_txn().await;
        let (request, before) = workflow.create("chk-1001", "alice", None).await.unwrap();

        assert_eq!(request.decision, Decision::Pending);
        assert_eq!(request.prior_status, TransactionStatus::Unmatched);
        assert_eq!(before.status, TransactionStatus::Unmatched);
        let held = storage.get_transaction("chk-1001").await.unwrap().unwrap();
        assert_eq!(held.status, TransactionStatus::Pending);
        assert_eq!(workflow.pending_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_pending_request_is_rejected() {
        let (mut workflow, _storage) = workflow_with_txn().await;
        workflow.create("chk-1001", "alice", None).await.unwrap();
        let second = workflow.create("chk-1001", "bob", None).await;
        assert!(matches!(second, Err(TrustError::Validation(_))));
        assert_eq!(workflow.pending_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_create_for_unknown_transaction() {
        let (mut workflow, _storage) = workflow_with_txn().await;
        let result = workflow.create("nope", "alice", None).await;
        assert!(matches!(result, Err(TrustError::TransactionNotFound(_))));
    }

    #[tokio::test]
    async fn test_approve_releases_and_makes_postable() {
        let (mut workflow, storage) = workflow_with_txn().await;
        let (request, _) = workflow.create("chk-1001", "alice", None).await.unwrap();
        assert!(!workflow.is_postable("chk-1001").await.unwrap());

        let outcome = workflow.approve(request.id, "bob").await.unwrap();
        assert_eq!(outcome.request.decision, Decision::Approved);
        assert!(outcome.request.decided_at.is_some());
        assert_eq!(outcome.transaction_after.status, TransactionStatus::Unmatched);

        let stored = storage.get_transaction("chk-1001").await.unwrap().unwrap();
        assert_eq!(stored.status, TransactionStatus::Unmatched);
        assert!(workflow.is_postable("chk-1001").await.unwrap());
    }

    #[tokio::test]
    async fn test_reject_restores_prior_state() {
        let (mut workflow, storage) = workflow_with_txn().await;
        let (request, _) = workflow.create("chk-1001", "alice", None).await.unwrap();

        let outcome = workflow.reject(request.id, "bob").await.unwrap();
        assert_eq!(outcome.request.decision, Decision::Rejected);
        let stored = storage.get_transaction("chk-1001").await.unwrap().unwrap();
        assert_eq!(stored.status, TransactionStatus::Unmatched);
        assert!(!stored.is_posted());
        assert!(!workflow.is_postable("chk-1001").await.unwrap());
    }

    #[tokio::test]
    async fn test_self_approval_is_refused() {
        let (mut workflow, _storage) = workflow_with_txn().await;
        let (request, _) = workflow.create("chk-1001", "alice", None).await.unwrap();
        let result = workflow.approve(request.id, "alice").await;
        assert!(matches!(result, Err(TrustError::Permission(_))));
        let stored = workflow.get_request_required(request.id).await.unwrap();
        assert!(stored.is_pending());
    }

    #[tokio::test]
    async fn test_decisions_are_not_repeatable() {
        let (mut workflow, _storage) = workflow_with_txn().await;
        let (request, _) = workflow.create("chk-1001", "alice", None).await.unwrap();
        workflow.approve(request.id, "bob").await.unwrap();

        assert!(matches!(
            workflow.approve(request.id, "carol").await,
            Err(TrustError::State { from: Decision::Approved, .. })
        ));
        assert!(matches!(
            workflow.reject(request.id, "carol").await,
            Err(TrustError::State { from: Decision::Approved, .. })
        ));
    }

    #[tokio::test]
    async fn test_concurrent_decisions_commit_once() {
        let (mut first, storage) = workflow_with_txn().await;
        let (request, _) = first.create("chk-1001", "alice", None).await.unwrap();
        let mut second = ApprovalWorkflow::new(storage.clone());

        let (a, b) = tokio::join!(
            first.approve(request.id, "bob"),
            second.reject(request.id, "carol"),
        );
        assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);

        let history = first.list_history().await.unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn test_listing_queries() {
        let (mut workflow, mut storage) = workflow_with_txn().await;
        let other = BankTransaction::new(
            "chk-1002".to_string(),
            Origin::Internal,
            NaiveDate::from_ymd_opt(2024, 1, 6).unwrap(),
            BigDecimal::from(-100),
            TransactionType::Withdrawal,
            None,
            "Filing fee".to_string(),
        );
        storage.save_transactions(&[other]).await.unwrap();

        let (first, _) = workflow.create("chk-1001", "alice", None).await.unwrap();
        let (second, _) = workflow.create("chk-1002", "bob", None).await.unwrap();
        workflow.approve(first.id, "bob").await.unwrap();

        let pending = workflow.list_pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, second.id);

        let by_alice = workflow.list_by_requester("alice").await.unwrap();
        assert_eq!(by_alice.len(), 1);
        assert_eq!(by_alice[0].id, first.id);

        let history = workflow.list_history().await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].decision, Decision::Approved);
    }
}
