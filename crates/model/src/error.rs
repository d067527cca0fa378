//! Model Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction. Model errors only ever come from parsing untrusted
//! strings (database columns, CLI arguments, upstream metadata).

use derive_more::{Display, Error};

/// A model error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for model operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Hash is not a recognised algorithm, or its digest is malformed.
    #[display("invalid content hash: {_0}")]
    InvalidHash(#[error(not(source))] String),
    #[display("unknown ecosystem: {_0}")]
    UnknownEcosystem(#[error(not(source))] String),
    #[display("unknown package status: {_0}")]
    UnknownStatus(#[error(not(source))] String),
    #[display("unknown file type: {_0}")]
    UnknownFileType(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
