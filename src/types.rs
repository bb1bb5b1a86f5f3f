//! Core types and data structures for the trust-accounting system

use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Where a transaction line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Origin {
    /// Imported from a bank statement
    Bank,
    /// Entered by the firm in its own books
    Internal,
}

/// Kind of movement on the trust account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Deposit,
    Withdrawal,
    Fee,
    Interest,
    TransferIn,
    TransferOut,
    Other,
}

impl TransactionType {
    /// Fees and interest are reported by the bank only and never have an
    /// internal counterpart.
    pub fn is_bank_only(&self) -> bool {
        matches!(self, TransactionType::Fee | TransactionType::Interest)
    }

    /// The internal-books equivalent of a bank transaction type, used by the
    /// fallback match.
    pub fn internal_equivalent(&self) -> TransactionType {
        match self {
            TransactionType::Deposit => TransactionType::Deposit,
            TransactionType::Withdrawal => TransactionType::Withdrawal,
            TransactionType::TransferIn => TransactionType::Deposit,
            TransactionType::TransferOut => TransactionType::Withdrawal,
            TransactionType::Fee => TransactionType::Withdrawal,
            TransactionType::Interest => TransactionType::Deposit,
            TransactionType::Other => TransactionType::Deposit,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Deposit => "DEPOSIT",
            TransactionType::Withdrawal => "WITHDRAWAL",
            TransactionType::Fee => "FEE",
            TransactionType::Interest => "INTEREST",
            TransactionType::TransferIn => "TRANSFER_IN",
            TransactionType::TransferOut => "TRANSFER_OUT",
            TransactionType::Other => "OTHER",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reconciliation and posting status of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Unmatched,
    Matched,
    /// Held by an outstanding approval request
    Pending,
    Cleared,
    Voided,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Unmatched => "UNMATCHED",
            TransactionStatus::Matched => "MATCHED",
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Cleared => "CLEARED",
            TransactionStatus::Voided => "VOIDED",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One bank-statement or internally recorded transaction line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankTransaction {
    /// Unique identifier for the transaction
    pub id: String,
    /// Bank statement line or internal entry
    pub origin: Origin,
    /// Date the transaction occurred
    pub transaction_date: NaiveDate,
    /// Signed amount with two fraction digits
    pub amount: BigDecimal,
    pub transaction_type: TransactionType,
    /// Check number, wire reference, etc.
    pub reference_number: Option<String>,
    pub description: String,
    pub status: TransactionStatus,
    /// Counterpart of a match. Only the bank-side record carries it.
    pub matched_transaction: Option<String>,
    /// When the transaction was posted to the ledger
    pub posted_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl BankTransaction {
    /// Create a new, unmatched transaction
    pub fn new(
        id: String,
        origin: Origin,
        transaction_date: NaiveDate,
        amount: BigDecimal,
        transaction_type: TransactionType,
        reference_number: Option<String>,
        description: String,
    ) -> Self {
        let now = chrono::Utc::now().naive_utc();
        Self {
            id,
            origin,
            transaction_date,
            amount,
            transaction_type,
            reference_number: reference_number.filter(|r| !r.trim().is_empty()),
            description,
            status: TransactionStatus::Unmatched,
            matched_transaction: None,
            posted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_bank(&self) -> bool {
        self.origin == Origin::Bank
    }

    pub fn is_posted(&self) -> bool {
        self.posted_at.is_some()
    }

    /// Change the status and bump the update timestamp
    pub fn set_status(&mut self, status: TransactionStatus) {
        self.status = status;
        self.updated_at = chrono::Utc::now().naive_utc();
    }
}

/// Outcome of an approval request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Pending,
    Approved,
    Rejected,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Pending => "PENDING",
            Decision::Approved => "APPROVED",
            Decision::Rejected => "REJECTED",
        }
    }

    /// Approved and rejected requests never change again
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Decision::Pending)
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dual-authorization request wrapping a transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: Uuid,
    /// The transaction held by this request
    pub transaction_id: String,
    pub requested_by: String,
    /// Set together with `decided_at` when the request is decided
    pub approver: Option<String>,
    pub decision: Decision,
    pub requested_at: NaiveDateTime,
    pub decided_at: Option<NaiveDateTime>,
    /// Transaction status before the request, restored when it is decided
    pub prior_status: TransactionStatus,
    pub note: Option<String>,
}

impl ApprovalRequest {
    /// Create a new pending request
    pub fn new(
        transaction_id: String,
        requested_by: String,
        prior_status: TransactionStatus,
        note: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            transaction_id,
            requested_by,
            approver: None,
            decision: Decision::Pending,
            requested_at: chrono::Utc::now().naive_utc(),
            decided_at: None,
            prior_status,
            note,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.decision == Decision::Pending
    }
}

/// Errors that can occur in the trust-accounting core
#[derive(Debug, thiserror::Error)]
pub enum TrustError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Permission denied: {0}")]
    Permission(String),
    #[error("Cannot {action} a request that is already {from}")]
    State { from: Decision, action: String },
    #[error("Persistence error: {0}")]
    Persistence(String),
    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),
    #[error("Approval request not found: {0}")]
    RequestNotFound(Uuid),
    #[error("Configuration error: {0}")]
    Config(String),
}

impl TrustError {
    /// HTTP status code for a thin web wrapper
    pub fn status_code(&self) -> u16 {
        match self {
            TrustError::Validation(_) => 400,
            TrustError::Permission(_) => 403,
            TrustError::TransactionNotFound(_) | TrustError::RequestNotFound(_) => 404,
            TrustError::State { .. } => 409,
            TrustError::Persistence(_) | TrustError::Config(_) => 500,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            TrustError::Validation(_) => "VALIDATION_ERROR",
            TrustError::Permission(_) => "PERMISSION_DENIED",
            TrustError::State { .. } => "INVALID_STATE",
            TrustError::Persistence(_) => "PERSISTENCE_ERROR",
            TrustError::TransactionNotFound(_) => "TRANSACTION_NOT_FOUND",
            TrustError::RequestNotFound(_) => "REQUEST_NOT_FOUND",
            TrustError::Config(_) => "CONFIG_ERROR",
        }
    }
}

impl From<config::ConfigError> for TrustError {
    fn from(err: config::ConfigError) -> Self {
        TrustError::Config(err.to_string())
    }
}

/// Result type for trust-accounting operations
pub type TrustResult<T> = Result<T, TrustError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_internal_equivalent_table() {
        use TransactionType::*;
        let table = [
            (Deposit, Deposit),
            (Withdrawal, Withdrawal),
            (TransferIn, Deposit),
            (TransferOut, Withdrawal),
            (Fee, Withdrawal),
            (Interest, Deposit),
            (Other, Deposit),
        ];
        for (bank, internal) in table {
            assert_eq!(bank.internal_equivalent(), internal, "{bank}");
        }
    }

    #[test]
    fn test_bank_only_types() {
        assert!(TransactionType::Fee.is_bank_only());
        assert!(TransactionType::Interest.is_bank_only());
        assert!(!TransactionType::Deposit.is_bank_only());
        assert!(!TransactionType::TransferOut.is_bank_only());
    }

    #[test]
    fn test_blank_reference_is_dropped() {
        let txn = BankTransaction::new(
            "b1".to_string(),
            Origin::Bank,
            NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
            BigDecimal::from_str("10.00").unwrap(),
            TransactionType::Deposit,
            Some("   ".to_string()),
            "Deposit".to_string(),
        );
        assert_eq!(txn.reference_number, None);
        assert_eq!(txn.status, TransactionStatus::Unmatched);
    }

    #[test]
    fn test_serialized_enum_names() {
        let json = serde_json::to_string(&TransactionType::TransferOut).unwrap();
        assert_eq!(json, "\"TRANSFER_OUT\"");
        let json = serde_json::to_string(&Decision::Approved).unwrap();
        assert_eq!(json, "\"APPROVED\"");
    }

    #[test]
    fn test_error_codes() {
        let err = TrustError::State {
            from: Decision::Approved,
            action: "approve".to_string(),
        };
        assert_eq!(err.status_code(), 409);
        assert_eq!(err.error_code(), "INVALID_STATE");
        assert!(err.to_string().contains("APPROVED"));
        assert_eq!(TrustError::Permission("x".into()).status_code(), 403);
        assert_eq!(TrustError::Persistence("x".into()).status_code(), 500);
    }
}
