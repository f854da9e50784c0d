//! Common test utilities

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

/// API key seeded for tests (middleware compares against its SHA-256 hash)
pub const TEST_API_KEY: &str = "test_key_123";

/// Setup test database - truncate tables and seed test data
pub async fn setup_test_db() -> PgPool {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must be set for tests");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    // Compute hash dynamically to match what the middleware expects
    let hash_check: String =
        sqlx::query_scalar("SELECT encode(sha256($1::bytea), 'hex')")
            .bind(TEST_API_KEY.as_bytes())
            .fetch_one(&pool)
            .await
            .unwrap();

    let mut tx = pool.begin().await.expect("Failed to begin transaction");

    // Clean up DB for fresh state
    sqlx::query(
        "TRUNCATE TABLE earning_events, withdrawal_events, idempotency_keys, notifications, accounts, api_keys, settings CASCADE",
    )
    .execute(&mut *tx)
    .await
    .expect("Failed to clean up DB");

    // Seed test API key with every permission the routes check
    sqlx::query(
        r#"
        INSERT INTO api_keys (id, name, key_hash, key_prefix, permissions, is_active)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (key_prefix) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind("Test Key")
    .bind(&hash_check)
    .bind("test_")
    .bind(vec![
        "admin".to_string(),
        "accounts".to_string(),
        "credit".to_string(),
        "resolve".to_string(),
    ])
    .bind(true)
    .execute(&mut *tx)
    .await
    .expect("Failed to seed API key");

    // Seed the minimum withdrawal threshold
    sqlx::query("INSERT INTO settings (key, value) VALUES ('minimum_withdrawal_amount', '25.00')")
        .execute(&mut *tx)
        .await
        .expect("Failed to seed settings");

    tx.commit().await.expect("Failed to commit transaction");

    pool
}

/// Insert an artist account directly and return its id
pub async fn create_account(pool: &PgPool, artist_name: &str) -> Uuid {
    sqlx::query_scalar(
        r#"
        INSERT INTO accounts (artist_name, email)
        VALUES ($1, $2)
        RETURNING id
        "#,
    )
    .bind(artist_name)
    .bind(format!("{}@example.com", artist_name))
    .fetch_one(pool)
    .await
    .expect("Failed to seed account")
}

/// Insert an earning event directly (the royalty-ingestion path)
pub async fn credit_earning(pool: &PgPool, account_id: Uuid, amount: &str) {
    sqlx::query(
        r#"
        INSERT INTO earning_events (account_id, amount, earned_at, description)
        VALUES ($1, $2::numeric, NOW() - INTERVAL '1 hour', 'Streaming royalties')
        "#,
    )
    .bind(account_id)
    .bind(amount)
    .execute(pool)
    .await
    .expect("Failed to seed earning");
}
