//! Crawl Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.
//!
//! Per-package failures are not errors at this level: they are reported as
//! [`CrawlEvent::Failed`](crate::CrawlEvent::Failed) and recorded against the
//! package in the index.

use derive_more::{Display, Error};

/// A crawl error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for crawl operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Discovery stopped early (source or index failure). Releases recorded
    /// before the failure are kept and ingestion still runs.
    #[display("release discovery failed")]
    Discovery,
    /// The ingestion backlog could not be read; the cycle cannot continue.
    #[display("could not load ingestion backlog")]
    Backlog,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    ///
    /// Both are expected to clear by the next cycle.
    pub fn is_retryable(&self) -> bool {
        true
    }

    /// Returns `true` if the cycle ended because of this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Backlog)
    }
}
