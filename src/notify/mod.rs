//! Notification Dispatcher
//!
//! Fire-and-forget lifecycle notifications. Dispatch enqueues a row in the
//! notifications outbox (consumed by the external mailer) on a spawned
//! task; a failed enqueue is logged and swallowed. A lifecycle transition
//! never waits on, or rolls back for, notification delivery.

use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{WithdrawalEvent, WithdrawalStatus};

/// Lifecycle events the dispatcher announces
#[derive(Debug, Clone)]
pub enum NotificationEvent {
    WithdrawalCreated { withdrawal: WithdrawalEvent },
    WithdrawalResolved { withdrawal: WithdrawalEvent },
}

impl NotificationEvent {
    /// Email template selector for the external mailer
    pub fn template_type(&self) -> &'static str {
        match self {
            NotificationEvent::WithdrawalCreated { .. } => "withdrawal_requested",
            NotificationEvent::WithdrawalResolved { withdrawal } => match withdrawal.status {
                WithdrawalStatus::Approved => "withdrawal_approved",
                WithdrawalStatus::Declined => "withdrawal_declined",
                // A resolved notification is only dispatched after a terminal
                // transition; pending here means a caller bug.
                WithdrawalStatus::Pending => "withdrawal_requested",
            },
        }
    }

    pub fn account_id(&self) -> Uuid {
        match self {
            NotificationEvent::WithdrawalCreated { withdrawal }
            | NotificationEvent::WithdrawalResolved { withdrawal } => withdrawal.account_id,
        }
    }

    /// Template payload handed to the mailer
    pub fn payload(&self) -> serde_json::Value {
        match self {
            NotificationEvent::WithdrawalCreated { withdrawal }
            | NotificationEvent::WithdrawalResolved { withdrawal } => serde_json::json!({
                "withdrawal_id": withdrawal.id,
                "amount": withdrawal.amount,
                "destination": withdrawal.destination,
                "status": withdrawal.status,
                "requested_at": withdrawal.requested_at,
                "processed_at": withdrawal.processed_at,
                "note": withdrawal.note,
            }),
        }
    }
}

/// Dispatcher writing to the notifications outbox
#[derive(Debug, Clone)]
pub struct NotificationDispatcher {
    pool: PgPool,
}

impl NotificationDispatcher {
    /// Create a new NotificationDispatcher
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Enqueue a notification without blocking the caller.
    ///
    /// Best-effort: the spawned task logs a warning on failure and nothing
    /// more. Callers must not depend on delivery.
    pub fn dispatch(&self, event: NotificationEvent) {
        let pool = self.pool.clone();

        tokio::spawn(async move {
            if let Err(e) = enqueue(&pool, &event).await {
                tracing::warn!(
                    template = event.template_type(),
                    account_id = %event.account_id(),
                    error = %e,
                    "Failed to enqueue notification"
                );
            }
        });
    }
}

async fn enqueue(pool: &PgPool, event: &NotificationEvent) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO notifications (account_id, template_type, payload)
        VALUES ($1, $2, $3)
        "#,
    )
    .bind(event.account_id())
    .bind(event.template_type())
    .bind(event.payload())
    .execute(pool)
    .await?;

    tracing::debug!(
        template = event.template_type(),
        account_id = %event.account_id(),
        "Notification enqueued"
    );

    Ok(())
}
