//! Withdrawal module
//!
//! The withdrawal lifecycle: validated, race-free admission of pending
//! requests; terminal resolution by an administrator; and the crediting
//! path that feeds the ledger.

mod commands;
mod credit_handler;
mod request_handler;
mod resolve_handler;
mod validator;

pub use commands::{CreditCommand, RequestWithdrawalCommand, ResolveWithdrawalCommand};
pub use credit_handler::CreditHandler;
pub use request_handler::RequestWithdrawalHandler;
pub use resolve_handler::ResolveWithdrawalHandler;
pub use validator::{DestinationRule, NonBlankDestination, WithdrawalValidator};
