//! Domain Error Types
//!
//! Pure domain errors that don't depend on infrastructure.

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

/// Rejection reasons and domain invariant failures.
///
/// These errors represent business rule violations independent of the
/// web/infrastructure layer. The first four are the validator's rejection
/// reasons in checking order.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    /// Amount failed to parse, was non-positive, or had sub-cent precision
    #[error("Malformed amount: {0}")]
    MalformedAmount(String),

    /// Amount is below the configured minimum withdrawal
    #[error("Amount is below the minimum withdrawal of {minimum}")]
    BelowMinimum { minimum: Decimal },

    /// Destination failed the payout-rail format check
    #[error("Invalid withdrawal destination")]
    InvalidDestination,

    /// Requested more than the available balance
    #[error("Insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance {
        requested: Decimal,
        available: Decimal,
    },

    /// Withdrawal already left the pending state
    #[error("Withdrawal {withdrawal_id} was already resolved")]
    AlreadyResolved { withdrawal_id: Uuid },

    /// Account not found
    #[error("Account not found: {0}")]
    AccountNotFound(Uuid),

    /// Withdrawal not found
    #[error("Withdrawal not found: {0}")]
    WithdrawalNotFound(Uuid),

    /// Computed available balance went negative. This is a bug or a race the
    /// atomicity guarantee failed to prevent, never a user error.
    #[error("Ledger inconsistency for account {account_id}: computed balance {computed}")]
    LedgerInconsistency { account_id: Uuid, computed: Decimal },
}

impl DomainError {
    /// Create an insufficient balance error
    pub fn insufficient_balance(requested: Decimal, available: Decimal) -> Self {
        Self::InsufficientBalance {
            requested,
            available,
        }
    }

    /// Check if this is a client error (recoverable by resubmission)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::MalformedAmount(_)
                | Self::BelowMinimum { .. }
                | Self::InvalidDestination
                | Self::InsufficientBalance { .. }
        )
    }

    /// Check if this is a state conflict (refresh, don't retry as-is)
    pub fn is_conflict_error(&self) -> bool {
        matches!(self, Self::AlreadyResolved { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_balance_error() {
        let err = DomainError::insufficient_balance(Decimal::new(100, 0), Decimal::new(50, 0));

        assert!(err.is_client_error());
        assert!(!err.is_conflict_error());
        assert!(err.to_string().contains("100"));
        assert!(err.to_string().contains("50"));
    }

    #[test]
    fn test_already_resolved_is_conflict() {
        let err = DomainError::AlreadyResolved {
            withdrawal_id: Uuid::new_v4(),
        };

        assert!(!err.is_client_error());
        assert!(err.is_conflict_error());
    }

    #[test]
    fn test_inconsistency_is_not_client_error() {
        let err = DomainError::LedgerInconsistency {
            account_id: Uuid::new_v4(),
            computed: Decimal::new(-100, 2),
        };

        assert!(!err.is_client_error());
        assert!(!err.is_conflict_error());
    }
}
