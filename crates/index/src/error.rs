//! Index Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use filedex_model::PackageId;

/// An index error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for index operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Connection, query or commit failure.
    #[display("database error")]
    Database,
    #[display("database migration error")]
    Migration,
    /// A stored value could not be converted to or from its model type.
    #[display("invalid index data: {_0}")]
    InvalidData(#[error(not(source))] &'static str),
    /// The requested status change is not one the state machine allows.
    #[display("invalid status transition for package {_0}")]
    InvalidTransition(#[error(not(source))] PackageId),
    #[display("package not found: {_0}")]
    NotFound(#[error(not(source))] PackageId),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    ///
    /// SQLite errors are mostly `SQLITE_BUSY` under write contention, which
    /// clears once the other writer commits.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Database)
    }
}
