//! API Integration Tests
//!
//! End-to-end withdrawal lifecycle through the HTTP layer. These tests
//! require a database connection (DATABASE_URL).

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    middleware,
};
use royalty_ledger::api;
use serde_json::{json, Value};
use tower::util::ServiceExt;
use uuid::Uuid;

mod common;

fn test_app(pool: sqlx::PgPool) -> axum::Router {
    api::create_router()
        .layer(middleware::from_fn_with_state(
            pool.clone(),
            api::middleware::auth_middleware,
        ))
        .with_state(pool)
}

async fn json_body(response: axum::response::Response) -> Value {
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn post_json(uri: &str, account_header: Option<Uuid>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("X-API-Key", common::TEST_API_KEY);

    if let Some(account_id) = account_header {
        builder = builder.header("X-Request-Account-Id", account_id.to_string());
    }

    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header("X-API-Key", common::TEST_API_KEY)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_withdrawal_lifecycle_e2e() {
    let pool = common::setup_test_db().await;
    let app = test_app(pool.clone());

    // 1. Provision an artist account
    let response = app
        .clone()
        .oneshot(post_json(
            "/accounts",
            None,
            json!({"artist_name": "nightdrive", "email": "nightdrive@example.com"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED, "Account creation failed");
    let account: Value = json_body(response).await;
    let account_id: Uuid = account["id"].as_str().unwrap().parse().unwrap();

    // 2. Credit day-1 royalties
    let response = app
        .clone()
        .oneshot(post_json(
            "/admin/credits",
            None,
            json!({
                "account_id": account_id,
                "amount": "100.00",
                "description": "July streaming royalties"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED, "Credit failed");

    // 3. Balance reflects the credit
    let response = app
        .clone()
        .oneshot(get(&format!("/accounts/{}/balance", account_id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["balance"], "100.00");

    // 4. Request a withdrawal of 30.00
    let response = app
        .clone()
        .oneshot(post_json(
            "/withdrawals",
            Some(account_id),
            json!({
                "account_id": account_id,
                "amount": "30.00",
                "destination": "wallet-A"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED, "Withdrawal request failed");
    let withdrawal = json_body(response).await;
    assert_eq!(withdrawal["status"], "pending");
    assert!(withdrawal["processed_at"].is_null() || withdrawal.get("processed_at").is_none());
    let withdrawal_id: Uuid = withdrawal["id"].as_str().unwrap().parse().unwrap();

    // 5. Pending withdrawal reserves funds immediately
    let response = app
        .clone()
        .oneshot(get(&format!("/accounts/{}/balance", account_id)))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["balance"], "70.00");

    // 6. Approve: balance unchanged, processed_at set
    let response = app
        .clone()
        .oneshot(post_json(
            &format!("/admin/withdrawals/{}/resolve", withdrawal_id),
            None,
            json!({"decision": "approved"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK, "Resolve failed");
    let resolved = json_body(response).await;
    assert_eq!(resolved["status"], "approved");
    assert!(resolved["processed_at"].is_string());

    let response = app
        .clone()
        .oneshot(get(&format!("/accounts/{}/balance", account_id)))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["balance"], "70.00");

    // 7. A second request for more than the remainder is rejected
    let response = app
        .clone()
        .oneshot(post_json(
            "/withdrawals",
            Some(account_id),
            json!({
                "account_id": account_id,
                "amount": "80.00",
                "destination": "wallet-A"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error_code"], "insufficient_balance");
}

#[tokio::test]
async fn test_minimum_withdrawal_boundary() {
    let pool = common::setup_test_db().await;
    let app = test_app(pool.clone());

    let account_id = common::create_account(&pool, "lo-fi-orchestra").await;
    common::credit_earning(&pool, account_id, "40.00").await;

    // 24.99 is below the 25.00 minimum
    let response = app
        .clone()
        .oneshot(post_json(
            "/withdrawals",
            Some(account_id),
            json!({
                "account_id": account_id,
                "amount": "24.99",
                "destination": "wallet-A"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error_code"], "below_minimum");

    // No event was created by the rejected request
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM withdrawal_events WHERE account_id = $1")
        .bind(account_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 0);

    // Exactly the minimum passes
    let response = app
        .clone()
        .oneshot(post_json(
            "/withdrawals",
            Some(account_id),
            json!({
                "account_id": account_id,
                "amount": "25.00",
                "destination": "wallet-A"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn test_decline_releases_funds() {
    let pool = common::setup_test_db().await;
    let app = test_app(pool.clone());

    let account_id = common::create_account(&pool, "static-bloom").await;
    common::credit_earning(&pool, account_id, "50.00").await;

    // Reserve the full balance
    let response = app
        .clone()
        .oneshot(post_json(
            "/withdrawals",
            Some(account_id),
            json!({
                "account_id": account_id,
                "amount": "50.00",
                "destination": "wallet-B"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let withdrawal = json_body(response).await;
    let withdrawal_id: Uuid = withdrawal["id"].as_str().unwrap().parse().unwrap();

    let response = app
        .clone()
        .oneshot(get(&format!("/accounts/{}/balance", account_id)))
        .await
        .unwrap();
    assert_eq!(json_body(response).await["balance"], "0.00");

    // Decline releases the reservation immediately
    let response = app
        .clone()
        .oneshot(post_json(
            &format!("/admin/withdrawals/{}/resolve", withdrawal_id),
            None,
            json!({"decision": "declined", "note": "Wallet failed verification"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let resolved = json_body(response).await;
    assert_eq!(resolved["status"], "declined");
    assert_eq!(resolved["note"], "Wallet failed verification");

    let response = app
        .clone()
        .oneshot(get(&format!("/accounts/{}/balance", account_id)))
        .await
        .unwrap();
    assert_eq!(json_body(response).await["balance"], "50.00");
}

#[tokio::test]
async fn test_resolve_is_idempotent_conflict() {
    let pool = common::setup_test_db().await;
    let app = test_app(pool.clone());

    let account_id = common::create_account(&pool, "velvet-tape").await;
    common::credit_earning(&pool, account_id, "100.00").await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/withdrawals",
            Some(account_id),
            json!({
                "account_id": account_id,
                "amount": "30.00",
                "destination": "wallet-A"
            }),
        ))
        .await
        .unwrap();
    let withdrawal_id: Uuid = json_body(response).await["id"].as_str().unwrap().parse().unwrap();

    // First resolution wins
    let response = app
        .clone()
        .oneshot(post_json(
            &format!("/admin/withdrawals/{}/resolve", withdrawal_id),
            None,
            json!({"decision": "approved"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Second resolution observes the conflict and changes nothing
    let response = app
        .clone()
        .oneshot(post_json(
            &format!("/admin/withdrawals/{}/resolve", withdrawal_id),
            None,
            json!({"decision": "declined"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = json_body(response).await;
    assert_eq!(body["error_code"], "already_resolved");

    let status: String =
        sqlx::query_scalar("SELECT status FROM withdrawal_events WHERE id = $1")
            .bind(withdrawal_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(status, "approved");
}

#[tokio::test]
async fn test_auth_and_account_header_required() {
    let pool = common::setup_test_db().await;
    let app = test_app(pool.clone());

    let account_id = common::create_account(&pool, "glasshouse").await;
    common::credit_earning(&pool, account_id, "100.00").await;

    // Missing API key
    let request = Request::builder()
        .method("GET")
        .uri(format!("/accounts/{}/balance", account_id))
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Missing X-Request-Account-Id on withdrawal
    let response = app
        .clone()
        .oneshot(post_json(
            "/withdrawals",
            None,
            json!({
                "account_id": account_id,
                "amount": "30.00",
                "destination": "wallet-A"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error_code"], "missing_header");

    // Acting account differs from the withdrawal account
    let other_account = common::create_account(&pool, "someone-else").await;
    let response = app
        .clone()
        .oneshot(post_json(
            "/withdrawals",
            Some(other_account),
            json!({
                "account_id": account_id,
                "amount": "30.00",
                "destination": "wallet-A"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = json_body(response).await;
    assert_eq!(body["error_code"], "unauthorized_account");
}

#[tokio::test]
async fn test_idempotent_withdrawal_replay() {
    let pool = common::setup_test_db().await;
    let app = test_app(pool.clone());

    let account_id = common::create_account(&pool, "modular-sunrise").await;
    common::credit_earning(&pool, account_id, "100.00").await;

    let key = Uuid::new_v4();
    let body = json!({
        "account_id": account_id,
        "amount": "30.00",
        "destination": "wallet-A"
    });

    let with_key = |body: &Value| {
        Request::builder()
            .method("POST")
            .uri("/withdrawals")
            .header("content-type", "application/json")
            .header("X-API-Key", common::TEST_API_KEY)
            .header("X-Request-Account-Id", account_id.to_string())
            .header("Idempotency-Key", key.to_string())
            .body(Body::from(body.to_string()))
            .unwrap()
    };

    let response = app.clone().oneshot(with_key(&body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let first = json_body(response).await;

    // The duplicate submission replays the original event
    let response = app.clone().oneshot(with_key(&body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let second = json_body(response).await;
    assert_eq!(first["id"], second["id"]);

    // Only one reservation was made
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM withdrawal_events WHERE account_id = $1")
        .bind(account_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);

    let response = app
        .clone()
        .oneshot(get(&format!("/accounts/{}/balance", account_id)))
        .await
        .unwrap();
    assert_eq!(json_body(response).await["balance"], "70.00");
}

#[tokio::test]
async fn test_withdrawal_listing_filters() {
    let pool = common::setup_test_db().await;
    let app = test_app(pool.clone());

    let account_id = common::create_account(&pool, "tidal-loops").await;
    common::credit_earning(&pool, account_id, "200.00").await;

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(post_json(
                "/withdrawals",
                Some(account_id),
                json!({
                    "account_id": account_id,
                    "amount": "30.00",
                    "destination": "wallet-A"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let response = app
        .clone()
        .oneshot(get(&format!(
            "/accounts/{}/withdrawals?status=pending",
            account_id
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["withdrawals"].as_array().unwrap().len(), 2);

    let response = app
        .clone()
        .oneshot(get("/admin/withdrawals?status=approved"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["withdrawals"].as_array().unwrap().len(), 0);
}
