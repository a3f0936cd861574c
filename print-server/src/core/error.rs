use thiserror::Error;

use crate::db::repository::RepoError;
use receipt_printer::PrintError;

/// Startup and lifecycle errors of the print server
///
/// Request handlers report through [`shared::error::AppError`]; these are
/// the failures that stop the process.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] RepoError),

    #[error("Printer error: {0}")]
    Printer(#[from] PrintError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ServerError>;
