//! Ledger Integration Tests
//!
//! Handler-level tests for the concurrency guarantees: no double-spend on
//! racing requests, exactly one winner on racing resolutions, and the
//! adjustment floor. These tests require a database connection
//! (DATABASE_URL).

use royalty_ledger::domain::{DomainError, OperationContext, WithdrawalDecision};
use royalty_ledger::withdrawal::{
    CreditCommand, CreditHandler, RequestWithdrawalCommand, RequestWithdrawalHandler,
    ResolveWithdrawalCommand, ResolveWithdrawalHandler,
};
use royalty_ledger::{AppError, LedgerRepository};
use rust_decimal_macros::dec;

mod common;

#[tokio::test]
async fn test_concurrent_requests_cannot_both_drain_balance() {
    let pool = common::setup_test_db().await;
    let account_id = common::create_account(&pool, "race-case").await;
    common::credit_earning(&pool, account_id, "50.00").await;

    let handler = RequestWithdrawalHandler::new(pool.clone());
    let context = OperationContext::new().with_request_account(account_id);

    let command = RequestWithdrawalCommand::new(
        account_id,
        "50.00".to_string(),
        "wallet-A".to_string(),
    );

    // Both requests target the entire balance at once
    let (first, second) = tokio::join!(
        handler.execute(command.clone(), None, &context),
        handler.execute(command.clone(), None, &context),
    );

    let results = [first, second];
    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "exactly one request may win: {:?}", results);

    let loser = results.iter().find(|r| r.is_err()).unwrap();
    assert!(
        matches!(
            loser,
            Err(AppError::Domain(DomainError::InsufficientBalance { .. }))
        ),
        "loser must observe the reservation: {:?}",
        loser
    );

    // The ledger holds exactly one reservation and the balance is zero
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM withdrawal_events WHERE account_id = $1")
            .bind(account_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(count, 1);

    let ledger = LedgerRepository::new(pool);
    let balance = ledger.available_balance(account_id, None).await.unwrap();
    assert_eq!(balance.value(), dec!(0.00));
}

#[tokio::test]
async fn test_concurrent_resolutions_have_one_winner() {
    let pool = common::setup_test_db().await;
    let account_id = common::create_account(&pool, "double-resolve").await;
    common::credit_earning(&pool, account_id, "100.00").await;

    let request_handler = RequestWithdrawalHandler::new(pool.clone());
    let context = OperationContext::new().with_request_account(account_id);
    let withdrawal = request_handler
        .execute(
            RequestWithdrawalCommand::new(account_id, "30.00".to_string(), "wallet-A".to_string()),
            None,
            &context,
        )
        .await
        .unwrap();

    let resolve_handler = ResolveWithdrawalHandler::new(pool.clone());
    let admin_context = OperationContext::new();

    let approve = ResolveWithdrawalCommand::new(withdrawal.id, WithdrawalDecision::Approved);
    let decline = ResolveWithdrawalCommand::new(withdrawal.id, WithdrawalDecision::Declined);

    let (first, second) = tokio::join!(
        resolve_handler.execute(approve, &admin_context),
        resolve_handler.execute(decline, &admin_context),
    );

    let results = [first, second];
    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "exactly one resolver may win: {:?}", results);

    let loser = results.iter().find(|r| r.is_err()).unwrap();
    assert!(
        matches!(
            loser,
            Err(AppError::Domain(DomainError::AlreadyResolved { .. }))
        ),
        "loser must observe AlreadyResolved: {:?}",
        loser
    );

    // The stored status is whichever decision won, applied exactly once
    let (status, processed_at): (String, Option<chrono::DateTime<chrono::Utc>>) =
        sqlx::query_as("SELECT status, processed_at FROM withdrawal_events WHERE id = $1")
            .bind(withdrawal.id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert!(status == "approved" || status == "declined");
    assert!(processed_at.is_some());
}

#[tokio::test]
async fn test_negative_adjustment_cannot_overdraw() {
    let pool = common::setup_test_db().await;
    let account_id = common::create_account(&pool, "correction-case").await;
    common::credit_earning(&pool, account_id, "100.00").await;

    let context = OperationContext::new();
    let request_handler = RequestWithdrawalHandler::new(pool.clone());
    let artist_context = OperationContext::new().with_request_account(account_id);

    // Reserve 70.00, leaving 30.00 available
    request_handler
        .execute(
            RequestWithdrawalCommand::new(account_id, "70.00".to_string(), "wallet-A".to_string()),
            None,
            &artist_context,
        )
        .await
        .unwrap();

    let credit_handler = CreditHandler::new(pool.clone());

    // Correcting more than is available would take the ledger negative
    let result = credit_handler
        .execute(
            CreditCommand::new(
                account_id,
                "-40.00".to_string(),
                "Chargeback on July royalties".to_string(),
            ),
            &context,
        )
        .await;
    assert!(
        matches!(
            result,
            Err(AppError::Domain(DomainError::InsufficientBalance { .. }))
        ),
        "overdraft adjustment must be rejected: {:?}",
        result
    );

    // A correction within the available balance is recorded
    let earning = credit_handler
        .execute(
            CreditCommand::new(
                account_id,
                "-20.00".to_string(),
                "Chargeback on July royalties".to_string(),
            ),
            &context,
        )
        .await
        .unwrap();
    assert_eq!(earning.amount, dec!(-20.00));

    let ledger = LedgerRepository::new(pool);
    let balance = ledger.available_balance(account_id, None).await.unwrap();
    assert_eq!(balance.value(), dec!(10.00));
}

#[tokio::test]
async fn test_notification_outbox_receives_lifecycle_events() {
    let pool = common::setup_test_db().await;
    let account_id = common::create_account(&pool, "notify-case").await;
    common::credit_earning(&pool, account_id, "100.00").await;

    let request_handler = RequestWithdrawalHandler::new(pool.clone());
    let context = OperationContext::new().with_request_account(account_id);
    let withdrawal = request_handler
        .execute(
            RequestWithdrawalCommand::new(account_id, "30.00".to_string(), "wallet-A".to_string()),
            None,
            &context,
        )
        .await
        .unwrap();

    let resolve_handler = ResolveWithdrawalHandler::new(pool.clone());
    resolve_handler
        .execute(
            ResolveWithdrawalCommand::new(withdrawal.id, WithdrawalDecision::Approved),
            &OperationContext::new(),
        )
        .await
        .unwrap();

    // Dispatch is fire-and-forget on spawned tasks; give them a moment
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    let templates: Vec<String> = sqlx::query_scalar(
        "SELECT template_type FROM notifications WHERE account_id = $1 ORDER BY created_at",
    )
    .bind(account_id)
    .fetch_all(&pool)
    .await
    .unwrap();

    assert!(templates.contains(&"withdrawal_requested".to_string()));
    assert!(templates.contains(&"withdrawal_approved".to_string()));
}
