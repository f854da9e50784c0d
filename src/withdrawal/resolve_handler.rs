//! Withdrawal Resolve Handler
//!
//! Terminal transitions of the withdrawal lifecycle. The status update is a
//! compare-and-set on `pending`, so of two concurrent resolvers exactly one
//! wins and the other observes `AlreadyResolved`. No balance recomputation
//! happens here: pending withdrawals already reserve funds, approval keeps
//! the reservation, and decline releases it because the calculator excludes
//! declined events.

use crate::domain::{DomainError, OperationContext, WithdrawalEvent};
use crate::error::AppError;
use crate::ledger::LedgerRepository;
use crate::notify::{NotificationDispatcher, NotificationEvent};

use super::ResolveWithdrawalCommand;

/// Handler for admin withdrawal resolution
pub struct ResolveWithdrawalHandler {
    ledger: LedgerRepository,
    dispatcher: NotificationDispatcher,
}

impl ResolveWithdrawalHandler {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self {
            ledger: LedgerRepository::new(pool.clone()),
            dispatcher: NotificationDispatcher::new(pool),
        }
    }

    /// Execute the resolve command
    pub async fn execute(
        &self,
        command: ResolveWithdrawalCommand,
        context: &OperationContext,
    ) -> Result<WithdrawalEvent, AppError> {
        let status = command.decision.into_status();

        let resolved = self
            .ledger
            .resolve_withdrawal(command.withdrawal_id, status, command.note.as_deref())
            .await?;

        match resolved {
            Some(withdrawal) => {
                tracing::info!(
                    withdrawal_id = %withdrawal.id,
                    account_id = %withdrawal.account_id,
                    status = %withdrawal.status,
                    resolved_by = ?context.api_key_id,
                    "Withdrawal resolved"
                );
                self.dispatcher.dispatch(NotificationEvent::WithdrawalResolved {
                    withdrawal: withdrawal.clone(),
                });
                Ok(withdrawal)
            }
            None => {
                // The CAS matched nothing: either the row is already
                // terminal or it never existed
                match self.ledger.get_withdrawal(command.withdrawal_id).await? {
                    Some(_) => Err(AppError::Domain(DomainError::AlreadyResolved {
                        withdrawal_id: command.withdrawal_id,
                    })),
                    None => Err(AppError::Domain(DomainError::WithdrawalNotFound(
                        command.withdrawal_id,
                    ))),
                }
            }
        }
    }
}
