//! Idempotency Repository
//!
//! Manages idempotency keys for withdrawal requests. A duplicate form
//! submission with the same key and payload replays the original withdrawal
//! instead of reserving funds twice. The check and completion run inside
//! the admission transaction, so a key is only marked completed together
//! with the withdrawal it produced.

use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

/// Idempotency key status
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdempotencyStatus {
    Processing,
    Completed,
    Failed,
}

impl From<String> for IdempotencyStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "completed" => IdempotencyStatus::Completed,
            "failed" => IdempotencyStatus::Failed,
            _ => IdempotencyStatus::Processing,
        }
    }
}

impl std::fmt::Display for IdempotencyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdempotencyStatus::Processing => write!(f, "processing"),
            IdempotencyStatus::Completed => write!(f, "completed"),
            IdempotencyStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Outcome of checking a key at the start of an admission transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdempotencyCheck {
    /// Key is new (or previously failed); proceed and call `complete`
    Fresh,
    /// Key already produced this withdrawal; return it unchanged
    Replay(Uuid),
}

/// Idempotency errors
#[derive(Debug, thiserror::Error)]
pub enum IdempotencyError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Idempotency key {0} is being processed by another request")]
    KeyInProgress(Uuid),

    #[error("Idempotency key {0} was used with a different request")]
    HashMismatch(Uuid),
}

/// SHA-256 hex digest of a command, used to detect key reuse across
/// different payloads.
pub fn request_hash<T: Serialize>(command: &T) -> String {
    let canonical = serde_json::to_vec(command).unwrap_or_default();
    let digest = Sha256::digest(&canonical);
    hex::encode(digest)
}

/// Repository for managing idempotency keys
#[derive(Debug, Clone)]
pub struct IdempotencyRepository {
    pool: PgPool,
}

impl IdempotencyRepository {
    /// Create a new IdempotencyRepository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Check (and claim) a key inside an open admission transaction.
    ///
    /// The row is locked so two transactions racing on the same key
    /// serialize here rather than both inserting withdrawals.
    pub async fn check(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        key: Uuid,
        hash: &str,
    ) -> Result<IdempotencyCheck, IdempotencyError> {
        let existing: Option<(String, String, Option<Uuid>)> = sqlx::query_as(
            r#"
            SELECT processing_status, request_hash, withdrawal_id
            FROM idempotency_keys
            WHERE key = $1
            FOR UPDATE
            "#,
        )
        .bind(key)
        .fetch_optional(&mut **tx)
        .await?;

        match existing {
            Some((status, stored_hash, withdrawal_id)) => {
                if stored_hash != hash {
                    return Err(IdempotencyError::HashMismatch(key));
                }

                match IdempotencyStatus::from(status) {
                    IdempotencyStatus::Completed => match withdrawal_id {
                        Some(id) => Ok(IdempotencyCheck::Replay(id)),
                        // Completed without a withdrawal id should not happen;
                        // treat as in-progress so the client retries later.
                        None => Err(IdempotencyError::KeyInProgress(key)),
                    },
                    IdempotencyStatus::Processing => Err(IdempotencyError::KeyInProgress(key)),
                    IdempotencyStatus::Failed => {
                        sqlx::query(
                            r#"
                            UPDATE idempotency_keys
                            SET processing_status = 'processing', processing_started_at = NOW()
                            WHERE key = $1
                            "#,
                        )
                        .bind(key)
                        .execute(&mut **tx)
                        .await?;
                        Ok(IdempotencyCheck::Fresh)
                    }
                }
            }
            None => {
                sqlx::query(
                    r#"
                    INSERT INTO idempotency_keys (key, request_hash, processing_status, processing_started_at)
                    VALUES ($1, $2, 'processing', NOW())
                    "#,
                )
                .bind(key)
                .bind(hash)
                .execute(&mut **tx)
                .await?;
                Ok(IdempotencyCheck::Fresh)
            }
        }
    }

    /// Mark a key completed, bound to the withdrawal it produced.
    /// Runs in the same transaction as the withdrawal insert.
    pub async fn complete(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        key: Uuid,
        withdrawal_id: Uuid,
    ) -> Result<(), IdempotencyError> {
        sqlx::query(
            r#"
            UPDATE idempotency_keys
            SET processing_status = 'completed', withdrawal_id = $2
            WHERE key = $1
            "#,
        )
        .bind(key)
        .bind(withdrawal_id)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    // =========================================================================
    // Maintenance (used by background jobs)
    // =========================================================================

    /// Reset keys stuck in `processing` for more than 5 minutes so the
    /// client's retry is not locked out forever.
    pub async fn reset_stale(&self) -> Result<u64, IdempotencyError> {
        let result = sqlx::query(
            r#"
            UPDATE idempotency_keys
            SET processing_status = 'failed'
            WHERE processing_status = 'processing'
              AND processing_started_at < NOW() - INTERVAL '5 minutes'
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Delete keys past their expiry
    pub async fn delete_expired(&self) -> Result<u64, IdempotencyError> {
        let result = sqlx::query(
            r#"
            DELETE FROM idempotency_keys
            WHERE expires_at < NOW()
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize)]
    struct FakeCommand {
        account_id: Uuid,
        amount: String,
    }

    #[test]
    fn test_request_hash_is_stable() {
        let command = FakeCommand {
            account_id: Uuid::nil(),
            amount: "30.00".to_string(),
        };

        assert_eq!(request_hash(&command), request_hash(&command));
    }

    #[test]
    fn test_request_hash_differs_per_payload() {
        let a = FakeCommand {
            account_id: Uuid::nil(),
            amount: "30.00".to_string(),
        };
        let b = FakeCommand {
            account_id: Uuid::nil(),
            amount: "31.00".to_string(),
        };

        assert_ne!(request_hash(&a), request_hash(&b));
    }

    #[test]
    fn test_status_from_string() {
        assert_eq!(
            IdempotencyStatus::from("completed".to_string()),
            IdempotencyStatus::Completed
        );
        assert_eq!(
            IdempotencyStatus::from("failed".to_string()),
            IdempotencyStatus::Failed
        );
        assert_eq!(
            IdempotencyStatus::from("anything-else".to_string()),
            IdempotencyStatus::Processing
        );
    }
}
