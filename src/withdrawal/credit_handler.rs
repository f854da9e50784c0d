//! Credit Handler
//!
//! Crediting path of the ledger: royalty payments and admin corrections.
//! Ordinary credits are strictly positive; a correction carries a negative
//! amount and is admitted only if the account's available balance stays
//! non-negative, checked under the same account lock the withdrawal path
//! uses.

use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;

use crate::domain::{Amount, DomainError, EarningEvent, OperationContext};
use crate::error::AppError;
use crate::ledger::LedgerRepository;

use super::CreditCommand;

/// Handler for royalty credits and adjustments
pub struct CreditHandler {
    ledger: LedgerRepository,
}

impl CreditHandler {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self {
            ledger: LedgerRepository::new(pool),
        }
    }

    /// Execute the credit command
    pub async fn execute(
        &self,
        command: CreditCommand,
        context: &OperationContext,
    ) -> Result<EarningEvent, AppError> {
        let raw = Decimal::from_str(&command.amount)
            .map_err(|e| DomainError::MalformedAmount(e.to_string()))?;
        let amount = Amount::validate_adjustment(raw)
            .map_err(|e| DomainError::MalformedAmount(e.to_string()))?;

        if command.description.trim().is_empty() {
            return Err(AppError::InvalidRequest(
                "Credit description must not be empty".to_string(),
            ));
        }

        const MAX_RETRIES: u32 = 3;

        for attempt in 0..MAX_RETRIES {
            match self.try_credit(&command, amount).await {
                Ok(earning) => {
                    tracing::info!(
                        earning_id = %earning.id,
                        account_id = %earning.account_id,
                        amount = %earning.amount,
                        credited_by = ?context.api_key_id,
                        "Earning recorded"
                    );
                    return Ok(earning);
                }
                Err(AppError::ConcurrencyConflict) if attempt < MAX_RETRIES - 1 => {
                    let delay = Duration::from_millis(50 * (attempt as u64 + 1));
                    tokio::time::sleep(delay).await;
                    continue;
                }
                Err(e) => return Err(e),
            }
        }

        Err(crate::ledger::LedgerError::MaxRetriesExceeded.into())
    }

    async fn try_credit(
        &self,
        command: &CreditCommand,
        amount: Decimal,
    ) -> Result<EarningEvent, AppError> {
        let mut tx = self.ledger.pool().begin().await?;

        self.ledger.lock_account(&mut tx, command.account_id).await?;

        // A correction must not take the account below zero; the offset it
        // targets may already be partially withdrawn
        if amount < Decimal::ZERO {
            let available = self
                .ledger
                .balance_in_tx(&mut tx, command.account_id)
                .await?;

            if available.value() + amount < Decimal::ZERO {
                return Err(AppError::Domain(DomainError::insufficient_balance(
                    -amount,
                    available.value(),
                )));
            }
        }

        let earning = self
            .ledger
            .insert_earning(
                &mut tx,
                command.account_id,
                amount,
                &command.description,
                command.source_release_id,
            )
            .await?;

        tx.commit()
            .await
            .map_err(|e| crate::ledger::LedgerError::from_sqlx(e, command.account_id))?;

        Ok(earning)
    }
}
