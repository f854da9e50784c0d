//! Idempotency module
//!
//! Duplicate-request protection for withdrawal submissions.

mod repository;

pub use repository::{
    request_hash, IdempotencyCheck, IdempotencyError, IdempotencyRepository, IdempotencyStatus,
};
