// ============================================================================
// PIPESTOCK - SHARED ERROR TYPES
// ============================================================================
// Module: shared/src/error.rs
// Description: Error taxonomy for the inventory core
// ============================================================================

use thiserror::Error;

/// All error kinds surfaced by the inventory core.
///
/// Transient kinds (`PiecesLocked`, `Concurrent`) are retry-safe: the caller
/// should re-read state and retry with backoff. Everything else is terminal
/// for the attempted operation.
#[derive(Error, Debug)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid production: {0}")]
    InvalidProduction(String),

    #[error("invalid cut: {0}")]
    InvalidCut(String),

    #[error("invalid split: {0}")]
    InvalidSplit(String),

    #[error("invalid dispatch: {0}")]
    InvalidDispatch(String),

    #[error("invalid return: {0}")]
    InvalidReturn(String),

    #[error("invalid scrap: {0}")]
    InvalidScrap(String),

    #[error("duplicate batch code: {0}")]
    DuplicateBatchCode(String),

    #[error("duplicate customer: {0}")]
    DuplicateCustomer(String),

    #[error("insufficient pieces: have {have}, need {need}")]
    InsufficientPieces { have: i64, need: i64 },

    #[error("pieces locked by another transaction, retry")]
    PiecesLocked,

    #[error("concurrent modification: {0}")]
    Concurrent(String),

    #[error("mixed scrap forbidden: {0}")]
    MixedScrapForbidden(String),

    #[error("already reverted: {0}")]
    AlreadyReverted(String),

    #[error("cannot revert: {0}")]
    CannotRevert(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

// Postgres SQLSTATEs that the core maps onto its own taxonomy:
// 55P03 lock_not_available (FOR UPDATE NOWAIT), 40001 serialization_failure,
// 40P01 deadlock_detected, 23505 unique_violation.
impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db) = err {
            match db.code().as_deref() {
                Some("55P03") => return Error::PiecesLocked,
                Some("40001") | Some("40P01") => {
                    return Error::Concurrent(db.message().to_string())
                }
                Some("23505") => return Error::AlreadyExists(db.message().to_string()),
                _ => {}
            }
        }
        if matches!(err, sqlx::Error::RowNotFound) {
            return Error::NotFound("row not found".to_string());
        }
        Error::Database(err)
    }
}

impl Error {
    /// Whether the caller may safely retry the whole operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::PiecesLocked | Error::Concurrent(_))
    }

    /// Per-item validation failure for multi-item operations; `index` is
    /// zero-based, the message reports it one-based.
    pub fn dispatch_item(index: usize, reason: impl std::fmt::Display) -> Self {
        Error::InvalidDispatch(format!("item {}: {}", index + 1, reason))
    }

    pub fn return_item(index: usize, reason: impl std::fmt::Display) -> Self {
        Error::InvalidReturn(format!("item {}: {}", index + 1, reason))
    }

    pub fn scrap_item(index: usize, reason: impl std::fmt::Display) -> Self {
        Error::InvalidScrap(format!("item {}: {}", index + 1, reason))
    }
}
