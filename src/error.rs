//! Error handling module
//!
//! Centralized error types and HTTP response conversion.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::domain::DomainError;
use crate::idempotency::IdempotencyError;
use crate::ledger::LedgerError;

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Client errors (4xx)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid API key")]
    InvalidApiKey,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Unauthorized: acting account does not match the withdrawal account")]
    UnauthorizedAccount,

    #[error("Idempotency conflict: same key with different request")]
    IdempotencyConflict,

    #[error("Concurrent modification detected")]
    ConcurrencyConflict,

    #[error("Missing required header: {0}")]
    MissingHeader(String),

    // Domain errors
    #[error(transparent)]
    Domain(#[from] DomainError),

    // Server errors (5xx)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Inconsistency {
                account_id,
                computed,
            } => AppError::Domain(DomainError::LedgerInconsistency {
                account_id,
                computed,
            }),
            LedgerError::ConcurrencyConflict { .. } | LedgerError::MaxRetriesExceeded => {
                AppError::ConcurrencyConflict
            }
            LedgerError::AccountNotFound(id) => AppError::Domain(DomainError::AccountNotFound(id)),
            LedgerError::WithdrawalNotFound(id) => {
                AppError::Domain(DomainError::WithdrawalNotFound(id))
            }
            LedgerError::Unavailable(e) => AppError::Database(e),
        }
    }
}

impl From<IdempotencyError> for AppError {
    fn from(err: IdempotencyError) -> Self {
        match err {
            IdempotencyError::Database(e) => AppError::Database(e),
            IdempotencyError::KeyInProgress(_) | IdempotencyError::HashMismatch(_) => {
                AppError::IdempotencyConflict
            }
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, details) = match &self {
            // 400 Bad Request
            AppError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", Some(msg.clone()))
            }
            AppError::MissingHeader(header) => {
                (StatusCode::BAD_REQUEST, "missing_header", Some(header.clone()))
            }

            // 401 Unauthorized
            AppError::InvalidApiKey => {
                (StatusCode::UNAUTHORIZED, "invalid_api_key", None)
            }

            // 403 Forbidden
            AppError::Forbidden(msg) => {
                (StatusCode::FORBIDDEN, "forbidden", Some(msg.clone()))
            }
            AppError::UnauthorizedAccount => {
                (StatusCode::FORBIDDEN, "unauthorized_account", None)
            }

            // 409 Conflict
            AppError::IdempotencyConflict => {
                (StatusCode::CONFLICT, "idempotency_conflict", None)
            }
            AppError::ConcurrencyConflict => {
                (StatusCode::CONFLICT, "concurrency_conflict", None)
            }

            // Domain errors - map to appropriate HTTP status
            AppError::Domain(ref domain_err) => match domain_err {
                DomainError::MalformedAmount(msg) => {
                    (StatusCode::BAD_REQUEST, "malformed_amount", Some(msg.clone()))
                }
                DomainError::BelowMinimum { .. } => {
                    (StatusCode::BAD_REQUEST, "below_minimum", Some(domain_err.to_string()))
                }
                DomainError::InvalidDestination => {
                    (StatusCode::BAD_REQUEST, "invalid_destination", None)
                }
                DomainError::InsufficientBalance { .. } => {
                    (StatusCode::BAD_REQUEST, "insufficient_balance", Some(domain_err.to_string()))
                }
                DomainError::AlreadyResolved { .. } => {
                    (StatusCode::CONFLICT, "already_resolved", Some("this request was already processed".to_string()))
                }
                DomainError::AccountNotFound(id) => {
                    (StatusCode::NOT_FOUND, "account_not_found", Some(id.to_string()))
                }
                DomainError::WithdrawalNotFound(id) => {
                    (StatusCode::NOT_FOUND, "withdrawal_not_found", Some(id.to_string()))
                }
                DomainError::LedgerInconsistency {
                    account_id,
                    computed,
                } => {
                    // Invariant violation: a bug or a race the atomicity
                    // guarantee failed to prevent. Alert, don't hide.
                    tracing::error!(
                        account_id = %account_id,
                        computed = %computed,
                        "LEDGER INCONSISTENCY: derived balance is negative"
                    );
                    (StatusCode::INTERNAL_SERVER_ERROR, "ledger_inconsistency", None)
                }
            },

            // 500 Internal Server Error
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
            AppError::Config(e) => {
                tracing::error!("Config error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "config_error", None)
            }
        };

        let body = ErrorResponse {
            error: self.to_string(),
            error_code: error_code.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}
