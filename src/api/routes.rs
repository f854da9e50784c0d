//! API Routes
//!
//! HTTP endpoint definitions.

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{OperationContext, WithdrawalDecision, WithdrawalEvent, WithdrawalStatus};
use crate::error::AppError;
use crate::ledger::{LedgerError, LedgerRepository};
use crate::withdrawal::{
    CreditCommand, CreditHandler, RequestWithdrawalCommand, RequestWithdrawalHandler,
    ResolveWithdrawalCommand, ResolveWithdrawalHandler,
};

use super::middleware::{AuthenticatedApiKey, RequestAccount};

// =========================================================================
// Request/Response types
// =========================================================================

#[derive(Debug, Deserialize)]
pub struct CreateAccountRequest {
    pub artist_name: String,
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub id: Uuid,
    pub artist_name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct BalanceQuery {
    #[serde(default)]
    pub as_of: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub account_id: Uuid,
    pub balance: Decimal,
    pub as_of: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct WithdrawRequest {
    pub account_id: Uuid,
    pub amount: String,
    pub destination: String,
}

#[derive(Debug, Serialize)]
pub struct WithdrawalResponse {
    pub id: Uuid,
    pub account_id: Uuid,
    pub amount: Decimal,
    pub destination: String,
    pub status: WithdrawalStatus,
    pub requested_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl From<WithdrawalEvent> for WithdrawalResponse {
    fn from(event: WithdrawalEvent) -> Self {
        Self {
            id: event.id,
            account_id: event.account_id,
            amount: event.amount,
            destination: event.destination,
            status: event.status,
            requested_at: event.requested_at,
            processed_at: event.processed_at,
            note: event.note,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    pub decision: WithdrawalDecision,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreditRequest {
    pub account_id: Uuid,
    pub amount: String,
    pub description: String,
    #[serde(default)]
    pub source_release_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct EarningResponse {
    pub id: Uuid,
    pub account_id: Uuid,
    pub amount: Decimal,
    pub earned_at: DateTime<Utc>,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_release_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

#[derive(Debug, Serialize)]
pub struct WithdrawalsListResponse {
    pub withdrawals: Vec<WithdrawalResponse>,
}

#[derive(Debug, Serialize)]
pub struct EarningsListResponse {
    pub account_id: Uuid,
    pub earnings: Vec<EarningResponse>,
}

// =========================================================================
// API Router
// =========================================================================

/// Create the API router
pub fn create_router() -> Router<PgPool> {
    Router::new()
        // Accounts
        .route("/accounts", post(create_account))
        .route("/accounts/:account_id/balance", get(get_balance))
        .route("/accounts/:account_id/earnings", get(list_earnings))
        .route("/accounts/:account_id/withdrawals", get(list_account_withdrawals))
        // Withdrawals
        .route("/withdrawals", post(request_withdrawal))
        // Admin
        .route("/admin/withdrawals", get(list_all_withdrawals))
        .route("/admin/withdrawals/:withdrawal_id/resolve", post(resolve_withdrawal))
        .route("/admin/credits", post(credit))
}

fn parse_status_filter(raw: &Option<String>) -> Result<Option<WithdrawalStatus>, AppError> {
    match raw {
        Some(s) => s
            .parse()
            .map(Some)
            .map_err(|e: String| AppError::InvalidRequest(e)),
        None => Ok(None),
    }
}

// =========================================================================
// POST /accounts
// =========================================================================

/// Provision an artist account
async fn create_account(
    State(pool): State<PgPool>,
    Extension(api_key): Extension<AuthenticatedApiKey>,
    Json(request): Json<CreateAccountRequest>,
) -> Result<(StatusCode, Json<AccountResponse>), AppError> {
    if !api_key.has_permission("accounts") {
        return Err(AppError::Forbidden("accounts permission required".to_string()));
    }

    if request.artist_name.trim().is_empty() {
        return Err(AppError::InvalidRequest(
            "artist_name must not be empty".to_string(),
        ));
    }

    let row: (Uuid, String, String, DateTime<Utc>) = sqlx::query_as(
        r#"
        INSERT INTO accounts (artist_name, email)
        VALUES ($1, $2)
        RETURNING id, artist_name, email, created_at
        "#,
    )
    .bind(&request.artist_name)
    .bind(&request.email)
    .fetch_one(&pool)
    .await?;

    let (id, artist_name, email, created_at) = row;

    Ok((
        StatusCode::CREATED,
        Json(AccountResponse {
            id,
            artist_name,
            email,
            created_at,
        }),
    ))
}

// =========================================================================
// GET /accounts/:account_id/balance
// =========================================================================

/// Derived available balance for an account.
///
/// A negative derived balance is an invariant violation: it is logged
/// loudly and the displayed value floors at zero. The write paths refuse
/// to operate on such a ledger instead of flooring.
async fn get_balance(
    State(pool): State<PgPool>,
    Path(account_id): Path<Uuid>,
    Query(query): Query<BalanceQuery>,
) -> Result<Json<BalanceResponse>, AppError> {
    let as_of = query.as_of.unwrap_or_else(Utc::now);
    let ledger = LedgerRepository::new(pool);

    let balance = match ledger.available_balance(account_id, Some(as_of)).await {
        Ok(balance) => balance.value(),
        Err(LedgerError::Inconsistency {
            account_id,
            computed,
        }) => {
            tracing::error!(
                account_id = %account_id,
                computed = %computed,
                "LEDGER INCONSISTENCY: derived balance is negative, displaying zero"
            );
            Decimal::ZERO
        }
        Err(e) => return Err(e.into()),
    };

    Ok(Json(BalanceResponse {
        account_id,
        balance,
        as_of,
    }))
}

// =========================================================================
// GET /accounts/:account_id/earnings
// =========================================================================

/// Earning history for an account
async fn list_earnings(
    State(pool): State<PgPool>,
    Path(account_id): Path<Uuid>,
    Query(query): Query<ListQuery>,
) -> Result<Json<EarningsListResponse>, AppError> {
    let ledger = LedgerRepository::new(pool);

    if !ledger.account_exists(account_id).await? {
        return Err(LedgerError::AccountNotFound(account_id).into());
    }

    let limit = query.limit.min(1000);
    let earnings = ledger
        .list_earnings(account_id, limit, query.offset)
        .await?;

    let earnings = earnings
        .into_iter()
        .map(|e| EarningResponse {
            id: e.id,
            account_id: e.account_id,
            amount: e.amount,
            earned_at: e.earned_at,
            description: e.description,
            source_release_id: e.source_release_id,
        })
        .collect();

    Ok(Json(EarningsListResponse {
        account_id,
        earnings,
    }))
}

// =========================================================================
// GET /accounts/:account_id/withdrawals
// =========================================================================

/// Withdrawal history for an account
async fn list_account_withdrawals(
    State(pool): State<PgPool>,
    Path(account_id): Path<Uuid>,
    Query(query): Query<ListQuery>,
) -> Result<Json<WithdrawalsListResponse>, AppError> {
    let status = parse_status_filter(&query.status)?;
    let ledger = LedgerRepository::new(pool);

    if !ledger.account_exists(account_id).await? {
        return Err(LedgerError::AccountNotFound(account_id).into());
    }

    let limit = query.limit.min(1000);
    let withdrawals = ledger
        .list_withdrawals(Some(account_id), status, limit, query.offset)
        .await?;

    Ok(Json(WithdrawalsListResponse {
        withdrawals: withdrawals.into_iter().map(Into::into).collect(),
    }))
}

// =========================================================================
// POST /withdrawals
// =========================================================================

/// Request a withdrawal
async fn request_withdrawal(
    State(pool): State<PgPool>,
    Extension(context): Extension<OperationContext>,
    request_account: Option<Extension<RequestAccount>>,
    headers: axum::http::HeaderMap,
    Json(request): Json<WithdrawRequest>,
) -> Result<(StatusCode, Json<WithdrawalResponse>), AppError> {
    // X-Request-Account-Id is required: the core never infers the acting
    // account from ambient state
    let request_account = request_account
        .ok_or_else(|| AppError::MissingHeader("X-Request-Account-Id".to_string()))?;

    let context = context.with_request_account(request_account.account_id);

    let idempotency_key = headers
        .get("Idempotency-Key")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok());

    let handler = RequestWithdrawalHandler::new(pool);

    let command = RequestWithdrawalCommand::new(
        request.account_id,
        request.amount,
        request.destination,
    );

    let withdrawal = handler.execute(command, idempotency_key, &context).await?;

    Ok((StatusCode::CREATED, Json(withdrawal.into())))
}

// =========================================================================
// GET /admin/withdrawals
// =========================================================================

/// List withdrawals across all accounts (admin only)
async fn list_all_withdrawals(
    State(pool): State<PgPool>,
    Extension(api_key): Extension<AuthenticatedApiKey>,
    Query(query): Query<ListQuery>,
) -> Result<Json<WithdrawalsListResponse>, AppError> {
    if !api_key.has_permission("resolve") {
        return Err(AppError::Forbidden("resolve permission required".to_string()));
    }

    let status = parse_status_filter(&query.status)?;
    let limit = query.limit.min(1000);

    let ledger = LedgerRepository::new(pool);
    let withdrawals = ledger
        .list_withdrawals(None, status, limit, query.offset)
        .await?;

    Ok(Json(WithdrawalsListResponse {
        withdrawals: withdrawals.into_iter().map(Into::into).collect(),
    }))
}

// =========================================================================
// POST /admin/withdrawals/:withdrawal_id/resolve
// =========================================================================

/// Approve or decline a pending withdrawal (admin only)
async fn resolve_withdrawal(
    State(pool): State<PgPool>,
    Extension(context): Extension<OperationContext>,
    Extension(api_key): Extension<AuthenticatedApiKey>,
    Path(withdrawal_id): Path<Uuid>,
    Json(request): Json<ResolveRequest>,
) -> Result<Json<WithdrawalResponse>, AppError> {
    if !api_key.has_permission("resolve") {
        return Err(AppError::Forbidden("resolve permission required".to_string()));
    }

    let handler = ResolveWithdrawalHandler::new(pool);

    let command = ResolveWithdrawalCommand {
        withdrawal_id,
        decision: request.decision,
        note: request.note,
    };

    let withdrawal = handler.execute(command, &context).await?;

    Ok(Json(withdrawal.into()))
}

// =========================================================================
// POST /admin/credits
// =========================================================================

/// Record a royalty credit or correction (admin only)
async fn credit(
    State(pool): State<PgPool>,
    Extension(context): Extension<OperationContext>,
    Extension(api_key): Extension<AuthenticatedApiKey>,
    Json(request): Json<CreditRequest>,
) -> Result<(StatusCode, Json<EarningResponse>), AppError> {
    if !api_key.has_permission("credit") {
        return Err(AppError::Forbidden("credit permission required".to_string()));
    }

    let handler = CreditHandler::new(pool);

    let command = CreditCommand {
        account_id: request.account_id,
        amount: request.amount,
        description: request.description,
        source_release_id: request.source_release_id,
    };

    let earning = handler.execute(command, &context).await?;

    Ok((
        StatusCode::CREATED,
        Json(EarningResponse {
            id: earning.id,
            account_id: earning.account_id,
            amount: earning.amount,
            earned_at: earning.earned_at,
            description: earning.description,
            source_release_id: earning.source_release_id,
        }),
    ))
}
