//! Balance Calculator
//!
//! Pure derivation of available balance from ledger events. The account's
//! balance is never stored; it is always this sum:
//!
//!   sum(earnings where earned_at <= as_of)
//!     - sum(withdrawals where status in {pending, approved}
//!           and requested_at <= as_of)
//!
//! Declined withdrawals are excluded unconditionally; declining releases the
//! reservation retroactively. Summation commutes, so insertion order never
//! affects the result. A negative result is reported as an inconsistency,
//! not clamped.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::{Balance, EarningEvent, WithdrawalEvent};

use super::LedgerError;

/// Sum of withdrawal amounts currently reserving funds as of the cutoff.
pub fn outstanding_withdrawals(withdrawals: &[WithdrawalEvent], as_of: DateTime<Utc>) -> Decimal {
    withdrawals
        .iter()
        .filter(|w| w.status.counts_against_balance() && w.requested_at <= as_of)
        .map(|w| w.amount)
        .sum()
}

/// Sum of earnings recognized as of the cutoff. Adjustment events carry
/// negative amounts and net out here.
pub fn recognized_earnings(earnings: &[EarningEvent], as_of: DateTime<Utc>) -> Decimal {
    earnings
        .iter()
        .filter(|e| e.earned_at <= as_of)
        .map(|e| e.amount)
        .sum()
}

/// Derive the available balance for one account's ledger at a point in time.
///
/// # Errors
/// `LedgerError::Inconsistency` if the computed value is negative. That can
/// only happen if the admission invariant was violated; callers log it at
/// `error!` and decide per surface whether to floor the display at zero.
pub fn available_balance(
    account_id: Uuid,
    earnings: &[EarningEvent],
    withdrawals: &[WithdrawalEvent],
    as_of: DateTime<Utc>,
) -> Result<Balance, LedgerError> {
    let computed = recognized_earnings(earnings, as_of) - outstanding_withdrawals(withdrawals, as_of);

    Balance::new(computed).map_err(|_| LedgerError::Inconsistency {
        account_id,
        computed,
    })
}
