//! Result and error types for the core library

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::AccountId;

/// Core library error type
///
/// The first six variants are the ledger's failure taxonomy. Callers are
/// expected to match on them; `is_retryable` tells transient failures apart
/// from caller errors.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Account not found: {}", format_ids(.0))]
    AccountNotFound(Vec<AccountId>),

    #[error("Insufficient funds in account {account_id}: balance {balance}, requested {requested}")]
    InsufficientFunds {
        account_id: AccountId,
        balance: Decimal,
        requested: Decimal,
    },

    #[error("Transaction aborted: {0}")]
    TransactionAborted(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Timed out after {waited_ms}ms waiting for the lock on account {account_id}")]
    LockTimeout { account_id: AccountId, waited_ms: u64 },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create an invalid amount error
    pub fn invalid_amount(msg: impl Into<String>) -> Self {
        Self::InvalidAmount(msg.into())
    }

    /// Create a not found error for a single account
    pub fn account_not_found(id: AccountId) -> Self {
        Self::AccountNotFound(vec![id])
    }

    /// Create an aborted-transaction error
    pub fn aborted(msg: impl Into<String>) -> Self {
        Self::TransactionAborted(msg.into())
    }

    /// Create a store unavailable error
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::StoreUnavailable(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// True for failures that did not take effect and may succeed on retry
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TransactionAborted(_) | Self::StoreUnavailable(_) | Self::LockTimeout { .. }
        )
    }

    /// Stable machine-readable name of the failure kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidAmount(_) => "invalid_amount",
            Self::AccountNotFound(_) => "account_not_found",
            Self::InsufficientFunds { .. } => "insufficient_funds",
            Self::TransactionAborted(_) => "transaction_aborted",
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::LockTimeout { .. } => "lock_timeout",
            Self::Validation(_) => "validation",
            Self::Json(_) => "json",
        }
    }
}

fn format_ids(ids: &[AccountId]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Core library result type
pub type Result<T> = std::result::Result<T, Error>;

/// Operation result with optional context (for JSON output)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResult<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    /// Failure kind, see `Error::kind`
    pub error_kind: Option<String>,
    pub retryable: bool,
    pub context: Option<HashMap<String, serde_json::Value>>,
}

impl<T> OperationResult<T> {
    /// Create a successful result
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            error_kind: None,
            retryable: false,
            context: None,
        }
    }

    /// Create a failed result from a core error
    pub fn fail(error: &Error) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.to_string()),
            error_kind: Some(error.kind().to_string()),
            retryable: error.is_retryable(),
            context: None,
        }
    }

    /// Attach a context entry
    pub fn with_context(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.context
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value);
        self
    }
}

impl<T> From<Result<T>> for OperationResult<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => Self::fail(&e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_result_ok() {
        let result: OperationResult<i32> = OperationResult::ok(42);
        assert!(result.success);
        assert_eq!(result.data, Some(42));
        assert!(result.error.is_none());
        assert!(!result.retryable);
    }

    #[test]
    fn test_operation_result_fail_carries_kind() {
        let err = Error::InsufficientFunds {
            account_id: 7,
            balance: Decimal::new(200, 0),
            requested: Decimal::new(9999, 0),
        };
        let result: OperationResult<i32> = OperationResult::fail(&err);
        assert!(!result.success);
        assert!(result.data.is_none());
        assert_eq!(result.error_kind.as_deref(), Some("insufficient_funds"));
        assert!(!result.retryable);
    }

    #[test]
    fn test_from_result() {
        let ok: Result<i32> = Ok(42);
        let result: OperationResult<i32> = ok.into();
        assert!(result.success);

        let err: Result<i32> = Err(Error::aborted("commit failed"));
        let result: OperationResult<i32> = err.into();
        assert!(!result.success);
        assert!(result.retryable);
        assert!(result.error.unwrap().contains("Transaction aborted"));
    }

    #[test]
    fn test_not_found_lists_every_id() {
        let err = Error::AccountNotFound(vec![3, 9]);
        assert_eq!(err.to_string(), "Account not found: 3, 9");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(Error::LockTimeout { account_id: 1, waited_ms: 10 }.is_retryable());
        assert!(Error::unavailable("down").is_retryable());
        assert!(!Error::invalid_amount("zero").is_retryable());
        assert!(!Error::account_not_found(1).is_retryable());
    }
}
