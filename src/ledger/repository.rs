//! Ledger Repository
//!
//! Data access for the append-only earning/withdrawal ledger. All balance
//! reads use the same inclusion rules as the pure calculator; all mutation
//! goes through the withdrawal handlers, which call the transactional
//! methods here so that admission and reservation commit as one unit.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::domain::{Balance, EarningEvent, WithdrawalEvent, WithdrawalStatus};

use super::LedgerError;

/// Database row for a withdrawal event
type WithdrawalRow = (
    Uuid,
    Uuid,
    Decimal,
    String,
    String,
    DateTime<Utc>,
    Option<DateTime<Utc>>,
    Option<String>,
);

/// Database row for an earning event
type EarningRow = (
    Uuid,
    Uuid,
    Decimal,
    DateTime<Utc>,
    String,
    Option<Uuid>,
    DateTime<Utc>,
);

fn withdrawal_from_row(row: WithdrawalRow) -> Result<WithdrawalEvent, LedgerError> {
    let (id, account_id, amount, destination, status, requested_at, processed_at, note) = row;

    let status: WithdrawalStatus = status
        .parse()
        .map_err(|e: String| LedgerError::Unavailable(sqlx::Error::Decode(e.into())))?;

    Ok(WithdrawalEvent {
        id,
        account_id,
        amount,
        destination,
        status,
        requested_at,
        processed_at,
        note,
    })
}

fn earning_from_row(row: EarningRow) -> EarningEvent {
    let (id, account_id, amount, earned_at, description, source_release_id, created_at) = row;
    EarningEvent {
        id,
        account_id,
        amount,
        earned_at,
        description,
        source_release_id,
        created_at,
    }
}

/// Statuses that reserve funds, as SQL bind values.
///
/// Mirrors `WithdrawalStatus::counts_against_balance` so the SQL sums and
/// the pure calculator can never disagree.
fn reserving_statuses() -> Vec<String> {
    [WithdrawalStatus::Pending, WithdrawalStatus::Approved]
        .iter()
        .filter(|s| s.counts_against_balance())
        .map(|s| s.as_str().to_string())
        .collect()
}

/// Repository over the per-account ledger tables
#[derive(Debug, Clone)]
pub struct LedgerRepository {
    pool: PgPool,
}

impl LedgerRepository {
    /// Create a new LedgerRepository with a database pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // =========================================================================
    // Balance derivation
    // =========================================================================

    /// Derived available balance for the read path (dashboard display).
    ///
    /// `as_of` defaults to now. Not concurrency-safe on its own; the
    /// withdrawal admission path recomputes under the account lock.
    pub async fn available_balance(
        &self,
        account_id: Uuid,
        as_of: Option<DateTime<Utc>>,
    ) -> Result<Balance, LedgerError> {
        if !self.account_exists(account_id).await? {
            return Err(LedgerError::AccountNotFound(account_id));
        }

        let as_of = as_of.unwrap_or_else(Utc::now);
        let computed = self.sum_ledger(&self.pool, account_id, as_of).await?;

        Balance::new(computed).map_err(|_| LedgerError::Inconsistency {
            account_id,
            computed,
        })
    }

    /// Balance computed inside an open transaction, after `lock_account`.
    pub async fn balance_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        account_id: Uuid,
    ) -> Result<Balance, LedgerError> {
        let as_of = Utc::now();
        let computed: Decimal = sqlx::query_scalar(BALANCE_SQL)
            .bind(account_id)
            .bind(as_of)
            .bind(reserving_statuses())
            .fetch_one(&mut **tx)
            .await
            .map_err(|e| LedgerError::from_sqlx(e, account_id))?;

        Balance::new(computed).map_err(|_| LedgerError::Inconsistency {
            account_id,
            computed,
        })
    }

    async fn sum_ledger(
        &self,
        pool: &PgPool,
        account_id: Uuid,
        as_of: DateTime<Utc>,
    ) -> Result<Decimal, LedgerError> {
        let computed: Decimal = sqlx::query_scalar(BALANCE_SQL)
            .bind(account_id)
            .bind(as_of)
            .bind(reserving_statuses())
            .fetch_one(pool)
            .await
            .map_err(|e| LedgerError::from_sqlx(e, account_id))?;

        Ok(computed)
    }

    // =========================================================================
    // Account row locking
    // =========================================================================

    /// Lock the account row for the duration of the transaction.
    ///
    /// Serializes every balance-check-then-reserve sequence touching this
    /// account; requests against other accounts proceed in parallel.
    pub async fn lock_account(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        account_id: Uuid,
    ) -> Result<(), LedgerError> {
        let locked: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM accounts WHERE id = $1 AND is_active FOR UPDATE")
                .bind(account_id)
                .fetch_optional(&mut **tx)
                .await
                .map_err(|e| LedgerError::from_sqlx(e, account_id))?;

        match locked {
            Some(_) => Ok(()),
            None => Err(LedgerError::AccountNotFound(account_id)),
        }
    }

    /// Check whether an active account exists
    pub async fn account_exists(&self, account_id: Uuid) -> Result<bool, LedgerError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM accounts WHERE id = $1 AND is_active)",
        )
        .bind(account_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    // =========================================================================
    // Earning events (append-only)
    // =========================================================================

    /// Append an earning event inside an open transaction.
    pub async fn insert_earning(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        account_id: Uuid,
        amount: Decimal,
        description: &str,
        source_release_id: Option<Uuid>,
    ) -> Result<EarningEvent, LedgerError> {
        let row: EarningRow = sqlx::query_as(
            r#"
            INSERT INTO earning_events (account_id, amount, earned_at, description, source_release_id)
            VALUES ($1, $2, NOW(), $3, $4)
            RETURNING id, account_id, amount, earned_at, description, source_release_id, created_at
            "#,
        )
        .bind(account_id)
        .bind(amount)
        .bind(description)
        .bind(source_release_id)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| LedgerError::from_sqlx(e, account_id))?;

        Ok(earning_from_row(row))
    }

    /// List earning events for an account, newest first
    pub async fn list_earnings(
        &self,
        account_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<EarningEvent>, LedgerError> {
        let rows: Vec<EarningRow> = sqlx::query_as(
            r#"
            SELECT id, account_id, amount, earned_at, description, source_release_id, created_at
            FROM earning_events
            WHERE account_id = $1
            ORDER BY earned_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(account_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(earning_from_row).collect())
    }

    // =========================================================================
    // Withdrawal events
    // =========================================================================

    /// Insert a new pending withdrawal inside an open transaction.
    ///
    /// The caller must hold the account lock and have verified sufficient
    /// balance in the same transaction.
    pub async fn insert_withdrawal(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        account_id: Uuid,
        amount: Decimal,
        destination: &str,
    ) -> Result<WithdrawalEvent, LedgerError> {
        let row: WithdrawalRow = sqlx::query_as(
            r#"
            INSERT INTO withdrawal_events (account_id, amount, destination, status, requested_at)
            VALUES ($1, $2, $3, 'pending', NOW())
            RETURNING id, account_id, amount, destination, status, requested_at, processed_at, note
            "#,
        )
        .bind(account_id)
        .bind(amount)
        .bind(destination)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| LedgerError::from_sqlx(e, account_id))?;

        withdrawal_from_row(row)
    }

    /// Load a withdrawal by ID
    pub async fn get_withdrawal(
        &self,
        withdrawal_id: Uuid,
    ) -> Result<Option<WithdrawalEvent>, LedgerError> {
        let row: Option<WithdrawalRow> = sqlx::query_as(
            r#"
            SELECT id, account_id, amount, destination, status, requested_at, processed_at, note
            FROM withdrawal_events
            WHERE id = $1
            "#,
        )
        .bind(withdrawal_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(withdrawal_from_row).transpose()
    }

    /// Compare-and-set transition out of `pending`.
    ///
    /// Returns `None` if the row was not in `pending` at commit time (or
    /// does not exist); of two concurrent resolvers exactly one gets the
    /// updated row back.
    pub async fn resolve_withdrawal(
        &self,
        withdrawal_id: Uuid,
        status: WithdrawalStatus,
        note: Option<&str>,
    ) -> Result<Option<WithdrawalEvent>, LedgerError> {
        let row: Option<WithdrawalRow> = sqlx::query_as(
            r#"
            UPDATE withdrawal_events
            SET status = $2, processed_at = NOW(), note = COALESCE($3, note)
            WHERE id = $1 AND status = 'pending'
            RETURNING id, account_id, amount, destination, status, requested_at, processed_at, note
            "#,
        )
        .bind(withdrawal_id)
        .bind(status.as_str())
        .bind(note)
        .fetch_optional(&self.pool)
        .await?;

        row.map(withdrawal_from_row).transpose()
    }

    /// List withdrawals, optionally scoped to one account and/or one status,
    /// newest first
    pub async fn list_withdrawals(
        &self,
        account_id: Option<Uuid>,
        status: Option<WithdrawalStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<WithdrawalEvent>, LedgerError> {
        let rows: Vec<WithdrawalRow> = sqlx::query_as(
            r#"
            SELECT id, account_id, amount, destination, status, requested_at, processed_at, note
            FROM withdrawal_events
            WHERE ($1::uuid IS NULL OR account_id = $1)
              AND ($2::text IS NULL OR status = $2)
            ORDER BY requested_at DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(account_id)
        .bind(status.map(|s| s.as_str()))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(withdrawal_from_row).collect()
    }
}

/// Shared balance query: recognized earnings minus reserving withdrawals,
/// both up to the cutoff. `$3` carries the reserving statuses.
const BALANCE_SQL: &str = r#"
    SELECT COALESCE((
        SELECT SUM(amount) FROM earning_events
        WHERE account_id = $1 AND earned_at <= $2
    ), 0)
    - COALESCE((
        SELECT SUM(amount) FROM withdrawal_events
        WHERE account_id = $1 AND requested_at <= $2 AND status = ANY($3)
    ), 0)
"#;
