//! Repository Module
//!
//! Query functions over the SQLite pool.

pub mod submission;

pub use submission::{InsertOutcome, SubmissionRecord};

use shared::error::{AppError, ErrorCode};
use thiserror::Error;

/// Repository error types
#[derive(Debug, Error)]
pub enum RepoError {
    /// The pool is closed or no connection could be acquired
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for RepoError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => {
                RepoError::Unavailable(err.to_string())
            }
            other => RepoError::Database(other.to_string()),
        }
    }
}

impl From<RepoError> for AppError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::Unavailable(msg) => AppError::with_message(ErrorCode::StoreUnavailable, msg),
            RepoError::Database(msg) => AppError::database(msg),
        }
    }
}

pub type RepoResult<T> = Result<T, RepoError>;
