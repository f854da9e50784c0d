//! Withdrawal Request Validator
//!
//! Ordered admission rules for withdrawal requests. The order is part of
//! the contract: the first failing rule determines the rejection, so error
//! precedence is deterministic and testable.
//!
//! The validator is pure. The available balance is passed in by the caller;
//! during admission that value comes from inside the same transaction that
//! inserts the withdrawal, which is what makes check-then-reserve atomic.

use std::str::FromStr;

use crate::domain::{Amount, Balance, DomainError};

/// Per-rail destination format check.
///
/// Each payout rail can plug in its own rule; the default only requires a
/// non-blank identifier.
pub trait DestinationRule: Send + Sync {
    fn is_valid(&self, destination: &str) -> bool;
}

/// Default rule: destination must be non-blank after trimming
#[derive(Debug, Clone, Copy, Default)]
pub struct NonBlankDestination;

impl DestinationRule for NonBlankDestination {
    fn is_valid(&self, destination: &str) -> bool {
        !destination.trim().is_empty()
    }
}

/// Validator for withdrawal requests
pub struct WithdrawalValidator {
    minimum: Amount,
    destination_rule: Box<dyn DestinationRule>,
}

impl WithdrawalValidator {
    /// Create a validator with the default destination rule
    pub fn new(minimum: Amount) -> Self {
        Self {
            minimum,
            destination_rule: Box::new(NonBlankDestination),
        }
    }

    /// Replace the destination rule for a specific payout rail
    pub fn with_destination_rule(mut self, rule: Box<dyn DestinationRule>) -> Self {
        self.destination_rule = rule;
        self
    }

    pub fn minimum(&self) -> &Amount {
        &self.minimum
    }

    /// Validate a request against the given available balance.
    ///
    /// Rules, in order (first failure wins):
    /// 1. amount is a well-formed positive minor-unit value
    /// 2. amount >= configured minimum
    /// 3. destination passes the rail's format check
    /// 4. amount <= available balance
    pub fn validate(
        &self,
        amount: &str,
        destination: &str,
        available: &Balance,
    ) -> Result<Amount, DomainError> {
        let amount = Amount::from_str(amount)
            .map_err(|e| DomainError::MalformedAmount(e.to_string()))?;

        if !amount.is_at_least(&self.minimum) {
            return Err(DomainError::BelowMinimum {
                minimum: self.minimum.value(),
            });
        }

        if !self.destination_rule.is_valid(destination) {
            return Err(DomainError::InvalidDestination);
        }

        if !available.is_sufficient_for(&amount) {
            return Err(DomainError::insufficient_balance(
                amount.value(),
                available.value(),
            ));
        }

        Ok(amount)
    }

    /// Run only the balance-independent rules (1-3).
    ///
    /// The request handler uses this before opening a transaction so that
    /// obviously bad input never takes the account lock.
    pub fn validate_shape(&self, amount: &str, destination: &str) -> Result<Amount, DomainError> {
        let amount = Amount::from_str(amount)
            .map_err(|e| DomainError::MalformedAmount(e.to_string()))?;

        if !amount.is_at_least(&self.minimum) {
            return Err(DomainError::BelowMinimum {
                minimum: self.minimum.value(),
            });
        }

        if !self.destination_rule.is_valid(destination) {
            return Err(DomainError::InvalidDestination);
        }

        Ok(amount)
    }
}
