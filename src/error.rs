//! Error types for store operations.

use rusqlite::ErrorCode;
use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by the crime store and the editors built on top of it.
#[derive(Error, Debug)]
pub enum StoreError {
    /// No row carries the requested identifier.
    #[error("crime {0} not found")]
    NotFound(Uuid),
    /// An insert collided with an existing identifier.
    #[error("crime {0} already exists")]
    DuplicateKey(Uuid),
    /// The crime's date cannot be written as epoch nanoseconds, which covers
    /// the years 1677 to 2262.
    #[error("crime {0} has a date outside the storable range")]
    DateOutOfRange(Uuid),
    /// The SQLite database could not be opened, queried or written, or a row
    /// failed to decode.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[from] rusqlite::Error),
    /// The data directory could not be created.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// A blocking storage task panicked or was aborted.
    #[error("storage task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;

impl StoreError {
    /// Turn a constraint violation on insert into `DuplicateKey`. The primary
    /// key is the only constraint on the table, so any violation is a clash.
    pub(crate) fn from_insert(err: rusqlite::Error, id: Uuid) -> Self {
        if matches!(
            err.sqlite_error_code(),
            Some(ErrorCode::ConstraintViolation)
        ) {
            Self::DuplicateKey(id)
        } else {
            Self::StorageUnavailable(err)
        }
    }
}
