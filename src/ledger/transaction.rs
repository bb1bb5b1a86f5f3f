//! Transaction recording, statement import and ledger posting

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use tracing::info;

use crate::traits::*;
use crate::types::*;
use crate::utils::validation::{normalize_amount, StatementLineValidator};

/// Transaction manager for handling transaction operations
pub struct TransactionManager<S: TrustStorage> {
    storage: S,
    validator: Box<dyn TransactionValidator>,
    statement_validator: Box<dyn TransactionValidator>,
}

impl<S: TrustStorage> TransactionManager<S> {
    /// Create a new transaction manager
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            validator: Box::new(DefaultTransactionValidator),
            statement_validator: Box::new(StatementLineValidator),
        }
    }

    /// Create a new transaction manager with custom validator for internal entries
    pub fn with_validator(storage: S, validator: Box<dyn TransactionValidator>) -> Self {
        Self {
            storage,
            validator,
            statement_validator: Box::new(StatementLineValidator),
        }
    }

    /// Record a new internal transaction
    pub async fn record_transaction(
        &mut self,
        mut transaction: BankTransaction,
    ) -> TrustResult<BankTransaction> {
        if transaction.origin != Origin::Internal {
            return Err(TrustError::Validation(
                "Bank-origin lines must be imported from a statement".to_string(),
            ));
        }
        self.validator.validate_transaction(&transaction)?;
        transaction.amount = normalize_amount(&transaction.amount)?;
        transaction.status = TransactionStatus::Unmatched;
        transaction.matched_transaction = None;
        transaction.posted_at = None;

        self.storage
            .save_transactions(std::slice::from_ref(&transaction))
            .await?;
        Ok(transaction)
    }

    /// Import bank-statement lines as one batch. Nothing is saved if any line
    /// is invalid or already exists.
    pub async fn import_statement(
        &mut self,
        lines: Vec<BankTransaction>,
    ) -> TrustResult<Vec<BankTransaction>> {
        let mut prepared = Vec::with_capacity(lines.len());
        for mut line in lines {
            self.statement_validator.validate_transaction(&line)?;
            line.amount = normalize_amount(&line.amount)?;
            line.status = TransactionStatus::Unmatched;
            line.matched_transaction = None;
            line.posted_at = None;
            prepared.push(line);
        }

        self.storage.save_transactions(&prepared).await?;
        info!(lines = prepared.len(), "Imported bank statement");
        Ok(prepared)
    }

    /// Get a transaction by ID
    pub async fn get_transaction(
        &self,
        transaction_id: &str,
    ) -> TrustResult<Option<BankTransaction>> {
        self.storage.get_transaction(transaction_id).await
    }

    /// Get a transaction by ID, returning an error if not found
    pub async fn get_transaction_required(
        &self,
        transaction_id: &str,
    ) -> TrustResult<BankTransaction> {
        self.storage
            .get_transaction(transaction_id)
            .await?
            .ok_or_else(|| TrustError::TransactionNotFound(transaction_id.to_string()))
    }

    /// List transactions matching a filter
    pub async fn find_transactions(
        &self,
        filter: &TransactionFilter,
    ) -> TrustResult<Vec<BankTransaction>> {
        self.storage.find_transactions(filter).await
    }

    /// Post a transaction to the ledger. Returns the record before and after.
    ///
    /// The caller is responsible for checking that posting is allowed.
    pub async fn post_transaction(
        &mut self,
        transaction_id: &str,
    ) -> TrustResult<(BankTransaction, BankTransaction)> {
        let transaction = self.get_transaction_required(transaction_id).await?;
        if transaction.is_posted() {
            return Err(TrustError::Validation(format!(
                "Transaction '{}' is already posted",
                transaction_id
            )));
        }

        let mut posted = transaction.clone();
        posted.posted_at = Some(chrono::Utc::now().naive_utc());
        if posted.status == TransactionStatus::Unmatched {
            posted.status = TransactionStatus::Cleared;
        }
        posted.updated_at = chrono::Utc::now().naive_utc();

        let mut changes = ChangeSet::new();
        changes.update_transaction(posted.clone(), transaction.status);
        self.storage.commit(changes).await?;

        info!(transaction_id, amount = %posted.amount, "Posted transaction to ledger");
        Ok((transaction, posted))
    }

    /// Sum of posted internal amounts dated on or before `as_of_date`
    pub async fn posted_balance(&self, as_of_date: Option<NaiveDate>) -> TrustResult<BigDecimal> {
        let transactions = self
            .storage
            .find_transactions(&TransactionFilter {
                origin: Some(Origin::Internal),
                end_date: as_of_date,
                ..Default::default()
            })
            .await?;

        Ok(transactions
            .iter()
            .filter(|t| t.is_posted() && t.status != TransactionStatus::Voided)
            .map(|t| &t.amount)
            .sum())
    }

    /// Delete a transaction. Matched and held transactions are refused.
    pub async fn delete_transaction(&mut self, transaction_id: &str) -> TrustResult<BankTransaction> {
        let transaction = self.get_transaction_required(transaction_id).await?;
        match transaction.status {
            TransactionStatus::Matched => {
                return Err(TrustError::Validation(format!(
                    "Transaction '{}' is matched; unmatch it first",
                    transaction_id
                )))
            }
            TransactionStatus::Pending => {
                return Err(TrustError::Validation(format!(
                    "Transaction '{}' has a pending approval request",
                    transaction_id
                )))
            }
            _ => {}
        }

        self.storage.delete_transaction(transaction_id).await?;
        Ok(transaction)
    }
}

/// Builder for transaction lines
#[derive(Debug)]
pub struct BankTransactionBuilder {
    transaction: BankTransaction,
}

impl BankTransactionBuilder {
    /// Create a new builder. Amount defaults to zero and type to `Other`.
    pub fn new(id: String, origin: Origin, date: NaiveDate, description: String) -> Self {
        Self {
            transaction: BankTransaction::new(
                id,
                origin,
                date,
                BigDecimal::from(0),
                TransactionType::Other,
                None,
                description,
            ),
        }
    }

    pub fn amount(mut self, amount: BigDecimal) -> Self {
        self.transaction.amount = amount;
        self
    }

    pub fn transaction_type(mut self, transaction_type: TransactionType) -> Self {
        self.transaction.transaction_type = transaction_type;
        self
    }

    /// Set the reference number (check number, wire reference, etc.)
    pub fn reference(mut self, reference: String) -> Self {
        if !reference.trim().is_empty() {
            self.transaction.reference_number = Some(reference);
        }
        self
    }

    /// Build the transaction
    pub fn build(mut self) -> TrustResult<BankTransaction> {
        DefaultTransactionValidator.validate_transaction(&self.transaction)?;
        self.transaction.amount = normalize_amount(&self.transaction.amount)?;
        Ok(self.transaction)
    }
}

/// Common trust-account transaction patterns
pub mod patterns {
    use super::*;

    /// Client funds received into trust
    pub fn create_client_deposit(
        id: String,
        date: NaiveDate,
        description: String,
        amount: BigDecimal,
        reference: Option<String>,
    ) -> TrustResult<BankTransaction> {
        let builder = BankTransactionBuilder::new(id, Origin::Internal, date, description)
            .amount(amount.abs())
            .transaction_type(TransactionType::Deposit);
        match reference {
            Some(r) => builder.reference(r).build(),
            None => builder.build(),
        }
    }

    /// Check drawn on the trust account. The amount is recorded as negative.
    pub fn create_check_disbursement(
        id: String,
        date: NaiveDate,
        payee: &str,
        amount: BigDecimal,
        check_number: String,
    ) -> TrustResult<BankTransaction> {
        BankTransactionBuilder::new(id, Origin::Internal, date, format!("Check to {payee}"))
            .amount(-amount.abs())
            .transaction_type(TransactionType::Withdrawal)
            .reference(check_number)
            .build()
    }

    /// One line of an imported bank statement
    pub fn create_statement_line(
        id: String,
        date: NaiveDate,
        transaction_type: TransactionType,
        amount: BigDecimal,
        reference: Option<String>,
        description: String,
    ) -> TrustResult<BankTransaction> {
        let builder = BankTransactionBuilder::new(id, Origin::Bank, date, description)
            .amount(amount)
            .transaction_type(transaction_type);
        match reference {
            Some(r) => builder.reference(r).build(),
            None => builder.build(),
        }
    }
}
