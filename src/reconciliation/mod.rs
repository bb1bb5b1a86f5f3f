//! Reconciliation of bank-statement lines against internally recorded
//! transactions
//!
//! [`ReconciliationEngine::reconcile_all`] plans every match in memory and
//! hands the result to the store as a single [`ChangeSet`], so a run either
//! lands completely or not at all.

pub mod matcher;

pub use matcher::{is_candidate, MatchOutcome, MatchRule, Matcher};

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, error, info};

use crate::config::ReconciliationConfig;
use crate::traits::*;
use crate::types::*;

/// A bank line paired with its internal counterpart
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedPair {
    pub bank_id: String,
    pub internal_id: String,
    pub rule: MatchRule,
}

/// Bank line and internal entry of one pair, taken at the same moment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairRecords {
    pub bank: BankTransaction,
    pub internal: BankTransaction,
}

/// Both records of a match as they were before the run and as it leaves them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchSnapshot {
    pub pair: MatchedPair,
    pub before: PairRecords,
    pub after: PairRecords,
}

/// Totals of one reconciliation run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationSummary {
    pub matched: usize,
    /// Fee and interest lines. Also included in `unmatched`.
    pub skipped_bank_only: usize,
    pub unmatched: usize,
    pub pairs: Vec<MatchedPair>,
}

/// Planned run: the summary plus the writes that realise it
#[derive(Debug, Clone, Default)]
pub struct ReconciliationPlan {
    pub summary: ReconciliationSummary,
    pub changes: ChangeSet,
    pub snapshots: Vec<MatchSnapshot>,
}

/// Reconciliation engine over a trust storage backend
pub struct ReconciliationEngine<S: TrustStorage> {
    storage: S,
    matcher: Matcher,
}

impl<S: TrustStorage> ReconciliationEngine<S> {
    /// Create a new reconciliation engine
    pub fn new(storage: S, config: &ReconciliationConfig) -> Self {
        Self {
            storage,
            matcher: Matcher::new(config.fuzzy_matching),
        }
    }

    /// Work out every match without writing anything
    pub async fn plan(&self) -> TrustResult<ReconciliationPlan> {
        let bank_lines = self
            .storage
            .find_transactions(&TransactionFilter {
                origin: Some(Origin::Bank),
                ..Default::default()
            })
            .await?;

        // internal entries already paired from the bank side stay out of the pool
        let already_paired: HashSet<String> = bank_lines
            .iter()
            .filter_map(|b| b.matched_transaction.clone())
            .collect();

        let candidates: Vec<BankTransaction> = self
            .storage
            .find_transactions(&TransactionFilter {
                origin: Some(Origin::Internal),
                ..Default::default()
            })
            .await?
            .into_iter()
            .filter(|t| is_candidate(t) && !already_paired.contains(&t.id))
            .collect();

        let mut claimed: HashSet<String> = HashSet::new();
        let mut plan = ReconciliationPlan::default();

        for bank in bank_lines
            .iter()
            .filter(|b| b.status == TransactionStatus::Unmatched)
        {
            match self.matcher.match_one(bank, &candidates, &claimed) {
                MatchOutcome::Matched { internal_id, rule } => {
                    let Some(internal) = candidates.iter().find(|c| c.id == internal_id) else {
                        continue;
                    };
                    info!(
                        bank_id = %bank.id,
                        internal_id = %internal.id,
                        rule = ?rule,
                        amount = %bank.amount,
                        "Matched bank transaction"
                    );

                    let mut bank_side = bank.clone();
                    bank_side.matched_transaction = Some(internal.id.clone());
                    bank_side.set_status(TransactionStatus::Matched);

                    let mut internal_side = internal.clone();
                    internal_side.set_status(TransactionStatus::Matched);

                    plan.changes
                        .update_transaction(bank_side.clone(), bank.status)
                        .update_transaction(internal_side.clone(), internal.status);

                    claimed.insert(internal.id.clone());
                    let pair = MatchedPair {
                        bank_id: bank.id.clone(),
                        internal_id,
                        rule,
                    };
                    plan.snapshots.push(MatchSnapshot {
                        pair: pair.clone(),
                        before: PairRecords {
                            bank: bank.clone(),
                            internal: internal.clone(),
                        },
                        after: PairRecords {
                            bank: bank_side,
                            internal: internal_side,
                        },
                    });
                    plan.summary.matched += 1;
                    plan.summary.pairs.push(pair);
                }
                MatchOutcome::SkippedBankOnly => {
                    debug!(
                        bank_id = %bank.id,
                        transaction_type = %bank.transaction_type,
                        "Skipped bank-only transaction"
                    );
                    plan.summary.skipped_bank_only += 1;
                    plan.summary.unmatched += 1;
                }
                MatchOutcome::Unmatched => {
                    info!(
                        bank_id = %bank.id,
                        date = %bank.transaction_date,
                        amount = %bank.amount,
                        "No internal match for bank transaction"
                    );
                    plan.summary.unmatched += 1;
                }
            }
        }

        Ok(plan)
    }

    /// Match every unmatched bank line and commit the result atomically.
    ///
    /// Already-matched lines are never revisited, so a rerun after a failure
    /// or a success is safe.
    pub async fn reconcile_all(&mut self) -> TrustResult<ReconciliationSummary> {
        self.reconcile_all_with_snapshots()
            .await
            .map(|(summary, _)| summary)
    }

    /// Same as [`reconcile_all`](Self::reconcile_all), also returning the
    /// before and after records of every committed match.
    pub async fn reconcile_all_with_snapshots(
        &mut self,
    ) -> TrustResult<(ReconciliationSummary, Vec<MatchSnapshot>)> {
        let ReconciliationPlan {
            summary,
            changes,
            snapshots,
        } = self.plan().await?;

        if !changes.is_empty() {
            if let Err(e) = self.storage.commit(changes).await {
                error!(error = %e, "Reconciliation run rolled back");
                return Err(match e {
                    TrustError::Persistence(_) => e,
                    other => TrustError::Persistence(other.to_string()),
                });
            }
        }

        info!(
            matched = summary.matched,
            skipped_bank_only = summary.skipped_bank_only,
            unmatched = summary.unmatched,
            "Reconciliation complete"
        );
        Ok((summary, snapshots))
    }

    /// Undo a match, returning both records as they are after the change.
    pub async fn unmatch(
        &mut self,
        bank_id: &str,
    ) -> TrustResult<(BankTransaction, BankTransaction)> {
        let bank = self
            .storage
            .get_transaction(bank_id)
            .await?
            .ok_or_else(|| TrustError::TransactionNotFound(bank_id.to_string()))?;

        let internal_id = match (&bank.origin, bank.status, &bank.matched_transaction) {
            (Origin::Bank, TransactionStatus::Matched, Some(id)) => id.clone(),
            _ => {
                return Err(TrustError::Validation(format!(
                    "Transaction '{}' is not a matched bank transaction",
                    bank_id
                )))
            }
        };
        let internal = self
            .storage
            .get_transaction(&internal_id)
            .await?
            .ok_or_else(|| TrustError::TransactionNotFound(internal_id.clone()))?;
        if internal.status != TransactionStatus::Matched {
            return Err(TrustError::Validation(format!(
                "Counterpart '{}' is {} and cannot be unmatched",
                internal.id, internal.status
            )));
        }

        let mut bank_side = bank.clone();
        bank_side.matched_transaction = None;
        bank_side.set_status(TransactionStatus::Unmatched);

        let mut internal_side = internal.clone();
        internal_side.set_status(if internal.is_posted() {
            TransactionStatus::Cleared
        } else {
            TransactionStatus::Unmatched
        });

        let mut changes = ChangeSet::new();
        changes
            .update_transaction(bank_side.clone(), bank.status)
            .update_transaction(internal_side.clone(), internal.status);
        self.storage.commit(changes).await?;

        info!(bank_id = %bank.id, internal_id = %internal.id, "Unmatched transaction pair");
        Ok((bank_side, internal_side))
    }
}
