//! Archive Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// An archive error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for archive operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Archive is corrupt, truncated or not what its name claims. Don't retry
    /// with the same input.
    #[display("invalid or corrupted archive")]
    InvalidData,
    /// The artifact is not an archive format we can enumerate.
    #[display("unsupported archive format: {_0}")]
    UnsupportedFormat(#[error(not(source))] String),
    /// Member count exceeded [`Limits::max_entries`](crate::Limits).
    #[display("archive has more than {_0} members")]
    TooManyEntries(#[error(not(source))] usize),
    /// Decompressed size exceeded [`Limits::max_total_bytes`](crate::Limits).
    #[display("archive expands to more than {_0} bytes")]
    TooLarge(#[error(not(source))] u64),
    /// Reading the underlying file failed.
    #[display("I/O error")]
    Io,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Io)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_display() {
        assert_eq!(ErrorKind::InvalidData.to_string(), "invalid or corrupted archive");
        assert_eq!(ErrorKind::UnsupportedFormat("rar".to_string()).to_string(), "unsupported archive format: rar");
        assert_eq!(ErrorKind::TooManyEntries(10).to_string(), "archive has more than 10 members");
    }

    #[test]
    fn error_kind_retryable() {
        assert!(!ErrorKind::InvalidData.is_retryable());
        assert!(!ErrorKind::TooLarge(1).is_retryable());
        assert!(ErrorKind::Io.is_retryable());
    }
}
