//! Query Error Types

use derive_more::{Display, Error};

/// A query error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for query operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The index could not be read.
    #[display("index unavailable")]
    Index,
    /// The caller's input can never match anything; fix the request.
    #[display("invalid query: {_0}")]
    InvalidInput(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Index)
    }
}
