//! Ledger Errors
//!
//! Error types for ledger storage and balance computation.

use rust_decimal::Decimal;
use uuid::Uuid;

/// Errors that can occur while reading or mutating the ledger
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Computed available balance went negative: bug or lost-update race.
    /// Logged loudly by callers; never clamped on the write path.
    #[error("Ledger inconsistency for account {account_id}: computed balance {computed}")]
    Inconsistency { account_id: Uuid, computed: Decimal },

    /// Per-account serialization failure (lock conflict or aborted
    /// serializable transaction); retryable
    #[error("Concurrent ledger mutation for account {account_id}")]
    ConcurrencyConflict { account_id: Uuid },

    /// Account not found
    #[error("Account not found: {0}")]
    AccountNotFound(Uuid),

    /// Withdrawal not found
    #[error("Withdrawal not found: {0}")]
    WithdrawalNotFound(Uuid),

    /// Datastore I/O failure; transient
    #[error("Ledger unavailable: {0}")]
    Unavailable(#[from] sqlx::Error),

    /// Maximum retries exceeded for an atomic admission
    #[error("Maximum retries exceeded for atomic ledger operation")]
    MaxRetriesExceeded,
}

impl LedgerError {
    /// Check if this error is a concurrency conflict
    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(self, LedgerError::ConcurrencyConflict { .. })
    }

    /// Check if retrying the whole transaction may help
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LedgerError::ConcurrencyConflict { .. } | LedgerError::Unavailable(_)
        )
    }

    /// Classify a sqlx error for an operation on the given account.
    ///
    /// Postgres signals serialization failures (40001) and deadlocks (40P01)
    /// through SQLSTATE; both mean the transaction should be retried from the
    /// top.
    pub fn from_sqlx(err: sqlx::Error, account_id: Uuid) -> Self {
        if let sqlx::Error::Database(ref db_err) = err {
            if let Some(code) = db_err.code() {
                if code == "40001" || code == "40P01" {
                    return LedgerError::ConcurrencyConflict { account_id };
                }
            }
        }
        LedgerError::Unavailable(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_is_retryable() {
        let err = LedgerError::ConcurrencyConflict {
            account_id: Uuid::new_v4(),
        };
        assert!(err.is_retryable());
        assert!(err.is_concurrency_conflict());
    }

    #[test]
    fn test_not_found_is_not_retryable() {
        let err = LedgerError::WithdrawalNotFound(Uuid::new_v4());
        assert!(!err.is_retryable());
        assert!(!err.is_concurrency_conflict());
    }

    #[test]
    fn test_inconsistency_is_not_retryable() {
        let err = LedgerError::Inconsistency {
            account_id: Uuid::new_v4(),
            computed: rust_decimal::Decimal::new(-1, 2),
        };
        assert!(!err.is_retryable());
    }
}
