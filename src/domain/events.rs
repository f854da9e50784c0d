//! Ledger records
//!
//! The two event kinds that make up an account's ledger, and the closed
//! status machine for withdrawals. Earning events are immutable facts;
//! withdrawal events mutate in exactly one way (a single transition out of
//! `Pending`).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// An earning credited to an artist account.
///
/// Append-only: never updated or deleted. Corrections are recorded as new
/// events with a negative amount, keeping history intact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EarningEvent {
    pub id: Uuid,
    pub account_id: Uuid,
    /// Positive for earnings, negative only for offsetting adjustments
    pub amount: Decimal,
    pub earned_at: DateTime<Utc>,
    pub description: String,
    pub source_release_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// A withdrawal requested by an artist.
///
/// `amount`, `destination`, `account_id`, and `requested_at` are immutable
/// after creation; only `status`, `processed_at`, and `note` change, once,
/// at resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalEvent {
    pub id: Uuid,
    pub account_id: Uuid,
    pub amount: Decimal,
    /// Wallet identifier on the payout rail
    pub destination: String,
    pub status: WithdrawalStatus,
    pub requested_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub note: Option<String>,
}

impl WithdrawalEvent {
    /// A withdrawal is terminal once it has left `Pending`.
    pub fn is_resolved(&self) -> bool {
        self.status != WithdrawalStatus::Pending
    }
}

/// Withdrawal lifecycle status.
///
/// `Pending -> Approved` and `Pending -> Declined` are the only transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalStatus {
    Pending,
    Approved,
    Declined,
}

impl WithdrawalStatus {
    /// Whether a withdrawal in this status reserves funds.
    ///
    /// Pending and approved withdrawals count against available balance;
    /// declined withdrawals never do, from the moment of decline.
    pub fn counts_against_balance(&self) -> bool {
        match self {
            WithdrawalStatus::Pending | WithdrawalStatus::Approved => true,
            WithdrawalStatus::Declined => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        match self {
            WithdrawalStatus::Pending => false,
            WithdrawalStatus::Approved | WithdrawalStatus::Declined => true,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WithdrawalStatus::Pending => "pending",
            WithdrawalStatus::Approved => "approved",
            WithdrawalStatus::Declined => "declined",
        }
    }
}

impl std::fmt::Display for WithdrawalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for WithdrawalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(WithdrawalStatus::Pending),
            "approved" => Ok(WithdrawalStatus::Approved),
            "declined" => Ok(WithdrawalStatus::Declined),
            other => Err(format!("unknown withdrawal status: {}", other)),
        }
    }
}

/// Admin decision on a pending withdrawal.
///
/// Separate from `WithdrawalStatus` so that `Pending` is unrepresentable as
/// a resolution target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalDecision {
    Approved,
    Declined,
}

impl WithdrawalDecision {
    pub fn into_status(self) -> WithdrawalStatus {
        match self {
            WithdrawalDecision::Approved => WithdrawalStatus::Approved,
            WithdrawalDecision::Declined => WithdrawalStatus::Declined,
        }
    }
}
