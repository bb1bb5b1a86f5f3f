//! Validation utilities

use bigdecimal::BigDecimal;

use crate::traits::*;
use crate::types::*;

/// Validate that an amount carries at most two significant fraction digits
pub fn validate_amount(amount: &BigDecimal) -> TrustResult<()> {
    let (_, scale) = amount.normalized().as_bigint_and_exponent();
    if scale > 2 {
        return Err(TrustError::Validation(format!(
            "Amount {} has more than two fraction digits",
            amount
        )));
    }
    Ok(())
}

/// Rescale an amount to exactly two fraction digits
pub fn normalize_amount(amount: &BigDecimal) -> TrustResult<BigDecimal> {
    validate_amount(amount)?;
    Ok(amount.with_scale(2))
}

/// Validate that a transaction ID is valid
pub fn validate_transaction_id(transaction_id: &str) -> TrustResult<()> {
    if transaction_id.trim().is_empty() {
        return Err(TrustError::Validation(
            "Transaction ID cannot be empty".to_string(),
        ));
    }

    if transaction_id.len() > 64 {
        return Err(TrustError::Validation(
            "Transaction ID cannot exceed 64 characters".to_string(),
        ));
    }

    if !transaction_id
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(TrustError::Validation(
            "Transaction ID can only contain alphanumeric characters, dashes, and underscores"
                .to_string(),
        ));
    }

    Ok(())
}

/// Validate that a transaction description is valid
pub fn validate_description(description: &str) -> TrustResult<()> {
    if description.trim().is_empty() {
        return Err(TrustError::Validation(
            "Transaction description cannot be empty".to_string(),
        ));
    }

    if description.len() > 500 {
        return Err(TrustError::Validation(
            "Transaction description cannot exceed 500 characters".to_string(),
        ));
    }

    Ok(())
}

/// Validate a two-letter state code and return it upper-cased
pub fn normalize_state_code(state_code: &str) -> TrustResult<String> {
    let code = state_code.trim();
    if code.len() != 2 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(TrustError::Validation(format!(
            "State code '{}' must be two letters",
            state_code
        )));
    }
    Ok(code.to_ascii_uppercase())
}

/// Stricter validator for statement imports: bank lines must carry the bank
/// origin and a non-zero amount.
pub struct StatementLineValidator;

impl TransactionValidator for StatementLineValidator {
    fn validate_transaction(&self, transaction: &BankTransaction) -> TrustResult<()> {
        DefaultTransactionValidator.validate_transaction(transaction)?;

        if transaction.origin != Origin::Bank {
            return Err(TrustError::Validation(format!(
                "Statement line '{}' is not bank-origin",
                transaction.id
            )));
        }

        if transaction.amount == BigDecimal::from(0) {
            return Err(TrustError::Validation(format!(
                "Statement line '{}' has a zero amount",
                transaction.id
            )));
        }

        Ok(())
    }
}
