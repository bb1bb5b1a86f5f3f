//! Matching rules that pair a bank-statement line with an internal entry

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::types::*;

/// Which rule produced a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchRule {
    /// Same reference number, date and amount
    Reference,
    /// Same date, amount and mapped transaction type
    Fuzzy,
}

/// Result of matching a single bank line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    Matched { internal_id: String, rule: MatchRule },
    /// Fee or interest line with no internal counterpart
    SkippedBankOnly,
    Unmatched,
}

/// Whether an internal transaction may be paired at all
pub fn is_candidate(txn: &BankTransaction) -> bool {
    txn.origin == Origin::Internal
        && matches!(
            txn.status,
            TransactionStatus::Unmatched | TransactionStatus::Cleared
        )
        && !txn.transaction_type.is_bank_only()
}

/// Stateless rule evaluation for one bank line against a candidate pool
#[derive(Debug, Clone, Copy)]
pub struct Matcher {
    pub fuzzy_matching: bool,
}

impl Default for Matcher {
    fn default() -> Self {
        Self {
            fuzzy_matching: true,
        }
    }
}

impl Matcher {
    pub fn new(fuzzy_matching: bool) -> Self {
        Self { fuzzy_matching }
    }

    /// Match `bank` against `candidates`, ignoring any id in `claimed`.
    ///
    /// Rules in order: bank-only skip, unique reference match, fuzzy match on
    /// the mapped type. Fuzzy ties go to the lowest id.
    pub fn match_one(
        &self,
        bank: &BankTransaction,
        candidates: &[BankTransaction],
        claimed: &HashSet<String>,
    ) -> MatchOutcome {
        if bank.transaction_type.is_bank_only() {
            return MatchOutcome::SkippedBankOnly;
        }

        let available = move || {
            candidates.iter().filter(move |c| {
                is_candidate(c)
                    && !claimed.contains(&c.id)
                    && c.transaction_date == bank.transaction_date
                    && c.amount == bank.amount
            })
        };

        if let Some(reference) = bank.reference_number.as_deref() {
            let mut by_reference =
                available().filter(|c| c.reference_number.as_deref() == Some(reference));
            if let (Some(only), None) = (by_reference.next(), by_reference.next()) {
                return MatchOutcome::Matched {
                    internal_id: only.id.clone(),
                    rule: MatchRule::Reference,
                };
            }
        }

        if self.fuzzy_matching {
            let mapped = bank.transaction_type.internal_equivalent();
            if let Some(first) = available()
                .filter(|c| c.transaction_type == mapped)
                .min_by(|a, b| a.id.cmp(&b.id))
            {
                return MatchOutcome::Matched {
                    internal_id: first.id.clone(),
                    rule: MatchRule::Fuzzy,
                };
            }
        }

        MatchOutcome::Unmatched
    }
}
