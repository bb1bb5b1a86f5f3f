//! In-memory storage implementation for testing

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

use crate::traits::*;
use crate::types::*;

#[derive(Debug, Default)]
struct Tables {
    transactions: HashMap<String, BankTransaction>,
    requests: HashMap<Uuid, ApprovalRequest>,
    sequences: HashMap<String, u64>,
}

/// In-memory storage implementation for testing and development
///
/// Clones share the same tables. A single lock covers all tables so a
/// [`ChangeSet`] is checked and applied as one step.
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    tables: Arc<RwLock<Tables>>,
    fail_next_commit: Arc<AtomicBool>,
}

impl MemoryStorage {
    /// Create a new memory storage instance
    pub fn new() -> Self {
        Self {
            tables: Arc::new(RwLock::new(Tables::default())),
            fail_next_commit: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Make the next `commit` fail after validation, before anything is
    /// written (useful for testing rollback)
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Clear all data (useful for testing)
    pub fn clear(&self) -> TrustResult<()> {
        let mut tables = self.write()?;
        *tables = Tables::default();
        Ok(())
    }

    fn read(&self) -> TrustResult<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| TrustError::Persistence("storage lock poisoned".to_string()))
    }

    fn write(&self) -> TrustResult<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| TrustError::Persistence("storage lock poisoned".to_string()))
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

fn check_change_set(tables: &Tables, changes: &ChangeSet) -> TrustResult<()> {
    for write in &changes.transactions {
        let stored = tables
            .transactions
            .get(&write.transaction.id)
            .ok_or_else(|| TrustError::TransactionNotFound(write.transaction.id.clone()))?;
        if stored.status != write.expected_status {
            return Err(TrustError::Persistence(format!(
                "Transaction '{}' changed concurrently: expected {}, found {}",
                stored.id, write.expected_status, stored.status
            )));
        }
    }

    let mut pending_inserts: Vec<&str> = Vec::new();
    for write in &changes.requests {
        match write {
            RequestWrite::Insert(request) => {
                let already_pending = tables.requests.values().any(|r| {
                    r.transaction_id == request.transaction_id && r.is_pending()
                }) || pending_inserts.contains(&request.transaction_id.as_str());
                if already_pending {
                    return Err(TrustError::Validation(format!(
                        "Transaction '{}' already has a pending approval request",
                        request.transaction_id
                    )));
                }
                pending_inserts.push(&request.transaction_id);
            }
            RequestWrite::Decide(request) => {
                let stored = tables
                    .requests
                    .get(&request.id)
                    .ok_or(TrustError::RequestNotFound(request.id))?;
                if !stored.is_pending() {
                    return Err(TrustError::State {
                        from: stored.decision,
                        action: "decide".to_string(),
                    });
                }
            }
        }
    }

    Ok(())
}

#[async_trait]
impl TrustStorage for MemoryStorage {
    async fn save_transactions(&mut self, transactions: &[BankTransaction]) -> TrustResult<()> {
        let mut tables = self.write()?;
        for (idx, txn) in transactions.iter().enumerate() {
            let duplicate_in_batch = transactions[..idx].iter().any(|t| t.id == txn.id);
            if duplicate_in_batch || tables.transactions.contains_key(&txn.id) {
                return Err(TrustError::Validation(format!(
                    "Transaction with ID '{}' already exists",
                    txn.id
                )));
            }
        }
        for txn in transactions {
            tables.transactions.insert(txn.id.clone(), txn.clone());
        }
        Ok(())
    }

    async fn get_transaction(&self, transaction_id: &str) -> TrustResult<Option<BankTransaction>> {
        Ok(self.read()?.transactions.get(transaction_id).cloned())
    }

    async fn find_transactions(
        &self,
        filter: &TransactionFilter,
    ) -> TrustResult<Vec<BankTransaction>> {
        let tables = self.read()?;
        let mut filtered: Vec<BankTransaction> = tables
            .transactions
            .values()
            .filter(|txn| filter.matches(txn))
            .cloned()
            .collect();
        filtered.sort_by(|a, b| {
            a.transaction_date
                .cmp(&b.transaction_date)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(filtered)
    }

    async fn delete_transaction(&mut self, transaction_id: &str) -> TrustResult<()> {
        if self.write()?.transactions.remove(transaction_id).is_some() {
            Ok(())
        } else {
            Err(TrustError::TransactionNotFound(transaction_id.to_string()))
        }
    }

    async fn get_request(&self, request_id: Uuid) -> TrustResult<Option<ApprovalRequest>> {
        Ok(self.read()?.requests.get(&request_id).cloned())
    }

    async fn find_requests(&self, filter: &RequestFilter) -> TrustResult<Vec<ApprovalRequest>> {
        let tables = self.read()?;
        let mut filtered: Vec<ApprovalRequest> = tables
            .requests
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        filtered.sort_by(|a, b| {
            a.requested_at
                .cmp(&b.requested_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(filtered)
    }

    async fn commit(&mut self, changes: ChangeSet) -> TrustResult<()> {
        let mut tables = self.write()?;
        check_change_set(&tables, &changes)?;

        if self.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(TrustError::Persistence(
                "injected commit failure".to_string(),
            ));
        }

        for write in changes.transactions {
            tables
                .transactions
                .insert(write.transaction.id.clone(), write.transaction);
        }
        for write in changes.requests {
            let request = match write {
                RequestWrite::Insert(request) | RequestWrite::Decide(request) => request,
            };
            tables.requests.insert(request.id, request);
        }
        Ok(())
    }

    async fn next_sequence(&mut self, partition: &str) -> TrustResult<u64> {
        let mut tables = self.write()?;
        let counter = tables.sequences.entry(partition.to_string()).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }
}
