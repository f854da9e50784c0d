//! Withdrawal Request Handler
//!
//! Admission path of the withdrawal lifecycle. The balance check and the
//! insertion of the pending event execute as one transaction under the
//! account's row lock, so two concurrent requests can never both observe
//! the same pre-reservation balance. Serialization failures retry from the
//! top with backoff; an aborted attempt leaves no partial state.

use std::time::Duration;

use uuid::Uuid;

use crate::domain::{OperationContext, WithdrawalEvent};
use crate::error::AppError;
use crate::idempotency::{request_hash, IdempotencyCheck, IdempotencyRepository};
use crate::ledger::LedgerRepository;
use crate::notify::{NotificationDispatcher, NotificationEvent};
use crate::settings::SettingsStore;

use super::{RequestWithdrawalCommand, WithdrawalValidator};

/// Outcome of a single admission attempt
enum Admission {
    Created(WithdrawalEvent),
    Replayed(WithdrawalEvent),
}

/// Handler for withdrawal requests
pub struct RequestWithdrawalHandler {
    ledger: LedgerRepository,
    idempotency: IdempotencyRepository,
    settings: SettingsStore,
    dispatcher: NotificationDispatcher,
}

impl RequestWithdrawalHandler {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self {
            ledger: LedgerRepository::new(pool.clone()),
            idempotency: IdempotencyRepository::new(pool.clone()),
            settings: SettingsStore::new(pool.clone()),
            dispatcher: NotificationDispatcher::new(pool),
        }
    }

    /// Execute the request command
    pub async fn execute(
        &self,
        command: RequestWithdrawalCommand,
        idempotency_key: Option<Uuid>,
        context: &OperationContext,
    ) -> Result<WithdrawalEvent, AppError> {
        // Authorization: the acting account must be the one withdrawing
        match context.request_account_id {
            Some(acting) if acting == command.account_id => {}
            Some(_) => return Err(AppError::UnauthorizedAccount),
            None => {
                return Err(AppError::MissingHeader("X-Request-Account-Id".to_string()));
            }
        }

        let minimum = self.settings.minimum_withdrawal_amount().await?;
        let validator = WithdrawalValidator::new(minimum);

        // Balance-independent rules first: malformed input never takes the
        // account lock
        validator.validate_shape(&command.amount, &command.destination)?;

        let hash = idempotency_key.map(|_| request_hash(&command));

        const MAX_RETRIES: u32 = 3;

        for attempt in 0..MAX_RETRIES {
            match self
                .try_admit(&command, &validator, idempotency_key, hash.as_deref())
                .await
            {
                Ok(Admission::Created(withdrawal)) => {
                    tracing::info!(
                        withdrawal_id = %withdrawal.id,
                        account_id = %withdrawal.account_id,
                        amount = %withdrawal.amount,
                        "Withdrawal requested"
                    );
                    self.dispatcher.dispatch(NotificationEvent::WithdrawalCreated {
                        withdrawal: withdrawal.clone(),
                    });
                    return Ok(withdrawal);
                }
                Ok(Admission::Replayed(withdrawal)) => {
                    tracing::debug!(
                        withdrawal_id = %withdrawal.id,
                        "Idempotent replay of withdrawal request"
                    );
                    return Ok(withdrawal);
                }
                Err(AppError::ConcurrencyConflict) if attempt < MAX_RETRIES - 1 => {
                    let delay = Duration::from_millis(50 * (attempt as u64 + 1));
                    tokio::time::sleep(delay).await;
                    tracing::warn!(
                        account_id = %command.account_id,
                        "Ledger conflict on withdrawal admission, retrying (attempt {}/{})",
                        attempt + 1,
                        MAX_RETRIES
                    );
                    continue;
                }
                Err(e) => return Err(e),
            }
        }

        Err(crate::ledger::LedgerError::MaxRetriesExceeded.into())
    }

    /// Single atomic admission attempt: lock, derive, validate, insert,
    /// commit.
    async fn try_admit(
        &self,
        command: &RequestWithdrawalCommand,
        validator: &WithdrawalValidator,
        idempotency_key: Option<Uuid>,
        hash: Option<&str>,
    ) -> Result<Admission, AppError> {
        let mut tx = self.ledger.pool().begin().await?;

        // Duplicate submission with the same key replays the original event
        if let (Some(key), Some(hash)) = (idempotency_key, hash) {
            if let IdempotencyCheck::Replay(existing_id) =
                self.idempotency.check(&mut tx, key, hash).await?
            {
                let existing = self
                    .ledger
                    .get_withdrawal(existing_id)
                    .await?
                    .ok_or_else(|| {
                        AppError::Internal(format!(
                            "Idempotency key resolved to missing withdrawal {}",
                            existing_id
                        ))
                    })?;
                return Ok(Admission::Replayed(existing));
            }
        }

        self.ledger.lock_account(&mut tx, command.account_id).await?;

        let available = self
            .ledger
            .balance_in_tx(&mut tx, command.account_id)
            .await?;

        // Dropping the transaction on rejection rolls back the key claim
        // along with everything else
        let amount = validator.validate(&command.amount, &command.destination, &available)?;

        let withdrawal = self
            .ledger
            .insert_withdrawal(&mut tx, command.account_id, amount.value(), &command.destination)
            .await?;

        if let Some(key) = idempotency_key {
            self.idempotency.complete(&mut tx, key, withdrawal.id).await?;
        }

        tx.commit()
            .await
            .map_err(|e| crate::ledger::LedgerError::from_sqlx(e, command.account_id))?;

        Ok(Admission::Created(withdrawal))
    }
}
