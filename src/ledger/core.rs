//! Main trust-ledger orchestrator that coordinates reconciliation, approvals
//! and posting behind the permission policy and the audit trail

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use tracing::{error, warn};
use uuid::Uuid;

use crate::approval::ApprovalWorkflow;
use crate::config::TrustConfig;
use crate::ledger::TransactionManager;
use crate::permissions::{check_permission, Action, Identity};
use crate::reconciliation::{ReconciliationEngine, ReconciliationSummary};
use crate::sequence::CaseNumberAllocator;
use crate::traits::*;
use crate::types::*;

/// Main trust-ledger system exposing the core operations
pub struct TrustLedger<S: TrustStorage> {
    transaction_manager: TransactionManager<S>,
    reconciliation: ReconciliationEngine<S>,
    approvals: ApprovalWorkflow<S>,
    case_numbers: CaseNumberAllocator<S>,
    authorizer: Box<dyn Authorizer>,
    audit: Box<dyn AuditSink>,
    config: TrustConfig,
}

impl<S: TrustStorage + Clone> TrustLedger<S> {
    /// Create a new ledger with the default configuration
    pub fn new(storage: S, authorizer: Box<dyn Authorizer>, audit: Box<dyn AuditSink>) -> Self {
        Self::with_config(storage, authorizer, audit, TrustConfig::default())
    }

    /// Create a new ledger with an explicit configuration
    pub fn with_config(
        storage: S,
        authorizer: Box<dyn Authorizer>,
        audit: Box<dyn AuditSink>,
        config: TrustConfig,
    ) -> Self {
        Self {
            transaction_manager: TransactionManager::new(storage.clone()),
            reconciliation: ReconciliationEngine::new(storage.clone(), &config.reconciliation),
            approvals: ApprovalWorkflow::new(storage.clone()),
            case_numbers: CaseNumberAllocator::new(storage, config.sequence.clone()),
            authorizer,
            audit,
            config,
        }
    }
}

impl<S: TrustStorage> TrustLedger<S> {
    pub fn config(&self) -> &TrustConfig {
        &self.config
    }

    /// Check that `actor` may perform `action`. Also used by outer layers for
    /// actions with no core operation (printing checks, managing users).
    pub fn authorize(&self, actor: &Identity, action: Action) -> TrustResult<()> {
        let capabilities = self.authorizer.capabilities(actor);
        check_permission(
            actor,
            &capabilities,
            action,
            self.config.approval.administrator_override,
        )
        .inspect_err(|e| {
            warn!(user = %actor.id, action = ?action, error = %e, "Permission denied");
        })
    }

    async fn emit(&self, event: AuditEvent) -> TrustResult<()> {
        let action = event.action;
        let subject = event.subject.clone();
        self.audit.record(event).await.map_err(|e| {
            error!(action = ?action, subject = %subject, error = %e, "Audit record failed");
            TrustError::Persistence(format!("audit record failed: {e}"))
        })
    }

    /// Emit every event of one committed change. A failing event does not
    /// stop the rest; the first failure is returned.
    async fn emit_all(&self, events: impl IntoIterator<Item = AuditEvent>) -> TrustResult<()> {
        let mut first_failure = None;
        for event in events {
            if let Err(e) = self.emit(event).await {
                first_failure.get_or_insert(e);
            }
        }
        first_failure.map_or(Ok(()), Err)
    }

    // Transaction operations
    /// Record an internal transaction
    pub async fn record_transaction(
        &mut self,
        actor: &Identity,
        transaction: BankTransaction,
    ) -> TrustResult<BankTransaction> {
        self.authorize(actor, Action::RecordTransaction)?;
        let saved = self.transaction_manager.record_transaction(transaction).await?;
        self.emit(
            AuditEvent::new(&actor.id, AuditAction::TransactionRecorded, &saved.id)
                .with_snapshots(None, Some(&saved)),
        )
        .await?;
        Ok(saved)
    }

    /// Import bank-statement lines
    pub async fn import_statement(
        &mut self,
        actor: &Identity,
        lines: Vec<BankTransaction>,
    ) -> TrustResult<Vec<BankTransaction>> {
        self.authorize(actor, Action::Reconcile)?;
        let imported = self.transaction_manager.import_statement(lines).await?;
        let events = imported.iter().map(|line| {
            AuditEvent::new(&actor.id, AuditAction::StatementImported, &line.id)
                .with_snapshots(None, Some(line))
        });
        self.emit_all(events).await?;
        Ok(imported)
    }

    /// Get a transaction by ID
    pub async fn get_transaction(
        &self,
        actor: &Identity,
        transaction_id: &str,
    ) -> TrustResult<Option<BankTransaction>> {
        self.authorize(actor, Action::ViewFinancialData)?;
        self.transaction_manager.get_transaction(transaction_id).await
    }

    /// List transactions matching a filter
    pub async fn list_transactions(
        &self,
        actor: &Identity,
        filter: &TransactionFilter,
    ) -> TrustResult<Vec<BankTransaction>> {
        self.authorize(actor, Action::ViewFinancialData)?;
        self.transaction_manager.find_transactions(filter).await
    }

    /// Administrative delete
    pub async fn delete_transaction(
        &mut self,
        actor: &Identity,
        transaction_id: &str,
    ) -> TrustResult<()> {
        self.authorize(actor, Action::DeleteTransaction)?;
        let removed = self
            .transaction_manager
            .delete_transaction(transaction_id)
            .await?;
        self.emit(
            AuditEvent::new(&actor.id, AuditAction::TransactionDeleted, transaction_id)
                .with_snapshots(Some(&removed), None),
        )
        .await
    }

    // Reconciliation
    /// Run the reconciliation matcher over every unmatched bank line
    pub async fn reconcile_all(&mut self, actor: &Identity) -> TrustResult<ReconciliationSummary> {
        self.authorize(actor, Action::Reconcile)?;
        let (summary, snapshots) = self.reconciliation.reconcile_all_with_snapshots().await?;
        let events = snapshots.iter().map(|snapshot| {
            AuditEvent::new(
                &actor.id,
                AuditAction::TransactionMatched,
                &snapshot.pair.bank_id,
            )
            .with_snapshots(Some(&snapshot.before), Some(&snapshot.after))
        });
        self.emit_all(events).await?;
        Ok(summary)
    }

    /// Undo a match from the bank side
    pub async fn unmatch(&mut self, actor: &Identity, bank_id: &str) -> TrustResult<()> {
        self.authorize(actor, Action::Reconcile)?;
        let (bank, internal) = self.reconciliation.unmatch(bank_id).await?;
        self.emit(
            AuditEvent::new(&actor.id, AuditAction::TransactionUnmatched, bank_id)
                .with_snapshots(None, Some(&(bank, internal))),
        )
        .await
    }

    // Approval workflow
    /// Open an approval request on behalf of `actor`
    pub async fn create_approval(
        &mut self,
        actor: &Identity,
        transaction_id: &str,
        note: Option<String>,
    ) -> TrustResult<ApprovalRequest> {
        self.authorize(actor, Action::RequestApproval)?;
        let (request, _) = self
            .approvals
            .create(transaction_id, &actor.id, note)
            .await?;
        self.emit(
            AuditEvent::new(&actor.id, AuditAction::ApprovalRequested, request.id.to_string())
                .with_snapshots(None, Some(&request)),
        )
        .await?;
        Ok(request)
    }

    /// Approve a pending request as `actor`
    pub async fn approve(&mut self, actor: &Identity, request_id: Uuid) -> TrustResult<ApprovalRequest> {
        self.authorize(actor, Action::ApproveTransaction)?;
        let before = self.approvals.get_request_required(request_id).await?;
        let outcome = self.approvals.approve(request_id, &actor.id).await?;
        self.emit(
            AuditEvent::new(&actor.id, AuditAction::ApprovalApproved, request_id.to_string())
                .with_snapshots(Some(&before), Some(&outcome.request)),
        )
        .await?;
        Ok(outcome.request)
    }

    /// Reject a pending request as `actor`
    pub async fn reject(&mut self, actor: &Identity, request_id: Uuid) -> TrustResult<ApprovalRequest> {
        self.authorize(actor, Action::RejectTransaction)?;
        let before = self.approvals.get_request_required(request_id).await?;
        let outcome = self.approvals.reject(request_id, &actor.id).await?;
        self.emit(
            AuditEvent::new(&actor.id, AuditAction::ApprovalRejected, request_id.to_string())
                .with_snapshots(Some(&before), Some(&outcome.request)),
        )
        .await?;
        Ok(outcome.request)
    }

    pub async fn get_approval(
        &self,
        actor: &Identity,
        request_id: Uuid,
    ) -> TrustResult<ApprovalRequest> {
        self.authorize(actor, Action::ViewFinancialData)?;
        self.approvals.get_request_required(request_id).await
    }

    pub async fn list_pending_approvals(&self, actor: &Identity) -> TrustResult<Vec<ApprovalRequest>> {
        self.authorize(actor, Action::ViewFinancialData)?;
        self.approvals.list_pending().await
    }

    pub async fn list_approvals_requested_by(
        &self,
        actor: &Identity,
        requester: &str,
    ) -> TrustResult<Vec<ApprovalRequest>> {
        self.authorize(actor, Action::ViewFinancialData)?;
        self.approvals.list_by_requester(requester).await
    }

    pub async fn list_approval_history(&self, actor: &Identity) -> TrustResult<Vec<ApprovalRequest>> {
        self.authorize(actor, Action::ViewFinancialData)?;
        self.approvals.list_history().await
    }

    pub async fn pending_approval_count(&self, actor: &Identity) -> TrustResult<usize> {
        self.authorize(actor, Action::ViewFinancialData)?;
        self.approvals.pending_count().await
    }

    pub async fn is_postable(&self, actor: &Identity, transaction_id: &str) -> TrustResult<bool> {
        self.authorize(actor, Action::ViewFinancialData)?;
        self.approvals.is_postable(transaction_id).await
    }

    // Ledger posting
    /// Post an approved transaction to the ledger
    pub async fn post_transaction(
        &mut self,
        actor: &Identity,
        transaction_id: &str,
    ) -> TrustResult<BankTransaction> {
        self.authorize(actor, Action::PostTransaction)?;
        if !self.approvals.is_postable(transaction_id).await? {
            // distinguish a missing transaction from an unapproved one
            self.transaction_manager
                .get_transaction_required(transaction_id)
                .await?;
            return Err(TrustError::Validation(format!(
                "Transaction '{}' has no approved request or is already posted",
                transaction_id
            )));
        }

        let (before, after) = self
            .transaction_manager
            .post_transaction(transaction_id)
            .await?;
        self.emit(
            AuditEvent::new(&actor.id, AuditAction::TransactionPosted, transaction_id)
                .with_snapshots(Some(&before), Some(&after)),
        )
        .await?;
        Ok(after)
    }

    /// Balance of posted internal transactions as of a date
    pub async fn posted_balance(
        &self,
        actor: &Identity,
        as_of_date: Option<NaiveDate>,
    ) -> TrustResult<BigDecimal> {
        self.authorize(actor, Action::ViewFinancialData)?;
        self.transaction_manager.posted_balance(as_of_date).await
    }

    // Case numbering
    /// Allocate the next case number for a state
    pub async fn next_case_number(&mut self, actor: &Identity, state_code: &str) -> TrustResult<String> {
        self.authorize(actor, Action::OpenCase)?;
        let number = self.case_numbers.next_case_number(state_code).await?;
        self.emit(AuditEvent::new(
            &actor.id,
            AuditAction::CaseNumberAllocated,
            number.as_str(),
        ))
        .await?;
        Ok(number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::transaction::patterns;
    use crate::permissions::{Capability, CapabilitySet, Role};
    use crate::utils::{MemoryAuditLog, MemoryStorage, StaticAuthorizer};

    fn ledger() -> (TrustLedger<MemoryStorage>, MemoryAuditLog) {
        let authorizer = StaticAuthorizer::new()
            .grant("clerk", CapabilitySet::staff())
            .grant(
                "partner",
                CapabilitySet::staff().with(Capability::ApproveTransactions),
            )
            .grant("root", CapabilitySet::new(Role::SystemAdministrator));
        let audit = MemoryAuditLog::new();
        let ledger = TrustLedger::new(
            MemoryStorage::new(),
            Box::new(authorizer),
            Box::new(audit.clone()),
        );
        (ledger, audit)
    }

    #[tokio::test]
    async fn test_record_approve_post_flow() {
        let (mut ledger, audit) = ledger();
        let clerk = Identity::new("clerk", "clerk");
        let partner = Identity::new("partner", "partner");

        let check = patterns::create_check_disbursement(
            "chk-1".to_string(),
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            "Opposing counsel",
            BigDecimal::from(400),
            "2001".to_string(),
        )
        .unwrap();
        ledger.record_transaction(&clerk, check).await.unwrap();

        // posting before approval is refused
        assert!(matches!(
            ledger.post_transaction(&clerk, "chk-1").await,
            Err(TrustError::Validation(_))
        ));

        let request = ledger.create_approval(&clerk, "chk-1", None).await.unwrap();
        let approved = ledger.approve(&partner, request.id).await.unwrap();
        assert_eq!(approved.decision, Decision::Approved);

        let posted = ledger.post_transaction(&clerk, "chk-1").await.unwrap();
        assert!(posted.is_posted());
        assert_eq!(
            ledger.posted_balance(&clerk, None).await.unwrap(),
            BigDecimal::from(-400)
        );

        let events = audit.events().unwrap();
        let actions: Vec<AuditAction> = events.iter().map(|e| e.action).collect();
        assert_eq!(
            actions,
            vec![
                AuditAction::TransactionRecorded,
                AuditAction::ApprovalRequested,
                AuditAction::ApprovalApproved,
                AuditAction::TransactionPosted,
            ]
        );
        assert!(events[2].before.is_some() && events[2].after.is_some());
    }

    #[tokio::test]
    async fn test_clerk_cannot_approve() {
        let (mut ledger, _audit) = ledger();
        let clerk = Identity::new("clerk", "clerk");
        let deposit = patterns::create_client_deposit(
            "dep-1".to_string(),
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            "Retainer".to_string(),
            BigDecimal::from(100),
            None,
        )
        .unwrap();
        ledger.record_transaction(&clerk, deposit).await.unwrap();
        let request = ledger.create_approval(&clerk, "dep-1", None).await.unwrap();

        let other_clerk = Identity::new("clerk-2", "second clerk");
        assert!(matches!(
            ledger.approve(&other_clerk, request.id).await,
            Err(TrustError::Permission(_))
        ));
    }

    #[tokio::test]
    async fn test_system_administrator_sees_no_financial_data() {
        let (ledger, _audit) = ledger();
        let root = Identity::new("root", "root");
        assert!(matches!(
            ledger.list_pending_approvals(&root).await,
            Err(TrustError::Permission(_))
        ));
        assert!(ledger.authorize(&root, Action::ManageUsers).is_err());
    }

    #[tokio::test]
    async fn test_match_events_carry_snapshots_and_survive_a_sink_failure() {
        let audit = MemoryAuditLog::new();
        let mut ledger = TrustLedger::new(
            MemoryStorage::new(),
            Box::new(
                StaticAuthorizer::new()
                    .grant("keeper", CapabilitySet::staff().with(Capability::Reconcile)),
            ),
            Box::new(audit.clone()),
        );
        let keeper = Identity::new("keeper", "keeper");
        let day = NaiveDate::from_ymd_opt(2024, 4, 2).unwrap();

        for (id, value) in [("int-1", 10), ("int-2", 20)] {
            let deposit = patterns::create_client_deposit(
                id.to_string(),
                day,
                "Deposit".to_string(),
                BigDecimal::from(value),
                None,
            )
            .unwrap();
            ledger.record_transaction(&keeper, deposit).await.unwrap();
        }
        let lines = [("bank-1", 10), ("bank-2", 20)]
            .into_iter()
            .map(|(id, value)| {
                patterns::create_statement_line(
                    id.to_string(),
                    day,
                    TransactionType::Deposit,
                    BigDecimal::from(value),
                    None,
                    "DEPOSIT".to_string(),
                )
                .unwrap()
            })
            .collect();
        ledger.import_statement(&keeper, lines).await.unwrap();

        audit.fail_next_record();
        let result = ledger.reconcile_all(&keeper).await;
        assert!(matches!(result, Err(TrustError::Persistence(_))));

        // the run itself committed and the second pair was still audited
        let matched = audit.events_of(AuditAction::TransactionMatched).unwrap();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].subject, "bank-2");
        let before = matched[0].before.as_ref().unwrap();
        let after = matched[0].after.as_ref().unwrap();
        assert_eq!(before["bank"]["status"], "UNMATCHED");
        assert_eq!(after["bank"]["status"], "MATCHED");
        assert_eq!(after["internal"]["id"], "int-2");
        assert_eq!(
            ledger
                .get_transaction(&keeper, "int-1")
                .await
                .unwrap()
                .unwrap()
                .status,
            TransactionStatus::Matched
        );
    }

    #[tokio::test]
    async fn test_case_numbers_are_audited() {
        let (mut ledger, audit) = ledger();
        let clerk = Identity::new("clerk", "clerk");
        assert_eq!(ledger.next_case_number(&clerk, "or").await.unwrap(), "OR-00001");
        let events = audit.events_of(AuditAction::CaseNumberAllocated).unwrap();
        assert_eq!(events[0].subject, "OR-00001");
    }
}
