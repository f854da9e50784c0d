//! royalty_ledger Library
//!
//! Re-exports modules for integration testing and external use.

pub mod api;
pub mod domain;
pub mod idempotency;
pub mod jobs;
pub mod ledger;
pub mod notify;
pub mod settings;
pub mod withdrawal;

// Private modules (used only by main.rs binary)
pub mod config;
pub mod db;
mod error;

pub use config::Config;
pub use domain::{Amount, AmountError, Balance, DomainError, OperationContext};
pub use domain::{EarningEvent, WithdrawalDecision, WithdrawalEvent, WithdrawalStatus};
pub use error::{AppError, AppResult};
pub use ledger::{LedgerError, LedgerRepository};
