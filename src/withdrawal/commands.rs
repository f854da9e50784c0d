//! Command definitions
//!
//! Commands represent intentions to change the ledger.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::WithdrawalDecision;

/// Command to request a withdrawal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestWithdrawalCommand {
    /// Artist account requesting the payout
    pub account_id: Uuid,
    /// Amount to withdraw (as string for precise decimal)
    pub amount: String,
    /// Wallet identifier on the payout rail
    pub destination: String,
}

impl RequestWithdrawalCommand {
    pub fn new(account_id: Uuid, amount: String, destination: String) -> Self {
        Self {
            account_id,
            amount,
            destination,
        }
    }
}

/// Command to resolve a pending withdrawal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveWithdrawalCommand {
    pub withdrawal_id: Uuid,
    pub decision: WithdrawalDecision,
    /// Optional admin note, shown to the artist
    pub note: Option<String>,
}

impl ResolveWithdrawalCommand {
    pub fn new(withdrawal_id: Uuid, decision: WithdrawalDecision) -> Self {
        Self {
            withdrawal_id,
            decision,
            note: None,
        }
    }

    pub fn with_note(mut self, note: String) -> Self {
        self.note = Some(note);
        self
    }
}

/// Command to credit royalties (or record an offsetting adjustment)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditCommand {
    /// Artist account being credited
    pub account_id: Uuid,
    /// Amount as string; negative values record a correction
    pub amount: String,
    /// Human-readable origin (royalty period, correction reason)
    pub description: String,
    /// Release this royalty was earned by, when known
    pub source_release_id: Option<Uuid>,
}

impl CreditCommand {
    pub fn new(account_id: Uuid, amount: String, description: String) -> Self {
        Self {
            account_id,
            amount,
            description,
            source_release_id: None,
        }
    }

    pub fn with_source_release(mut self, release_id: Uuid) -> Self {
        self.source_release_id = Some(release_id);
        self
    }
}
