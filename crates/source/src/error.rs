//! Source Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.
//!
//! Every fetch failure is either *transient* ([`ErrorKind::is_retryable`]
//! returns `true`, the crawler backs off and tries again) or *permanent* (the
//! package is marked as failed and left alone).

use derive_more::{Display, Error};
use filedex_archive::error::{Error as ArchiveError, ErrorKind as ArchiveErrorKind};

/// A source error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for source operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Connection failure, timeout or interrupted transfer.
    #[display("network error")]
    Network,
    /// Upstream asked us to slow down.
    #[display("rate limited")]
    RateLimited,
    /// Unexpected HTTP status.
    #[display("unexpected HTTP status {_0}")]
    Status(#[error(not(source))] u16),
    /// Downloaded bytes don't match the upstream digest (truncated transfer,
    /// misbehaving mirror).
    #[display("artifact digest mismatch")]
    DigestMismatch,
    /// Local scratch space failed.
    #[display("I/O error")]
    Io,
    /// Project or artifact no longer exists upstream.
    #[display("not found upstream")]
    NotFound,
    /// The artifact is not a readable archive.
    #[display("malformed artifact")]
    MalformedArtifact,
    /// The artifact is in a format we cannot enumerate.
    #[display("unsupported artifact: {_0}")]
    Unsupported(#[error(not(source))] String),
    /// The artifact (or its decompressed contents) exceeds configured limits.
    #[display("artifact exceeds size limits")]
    TooLarge,
    /// Upstream metadata could not be parsed.
    #[display("invalid upstream metadata")]
    InvalidMetadata,
    /// The adapter was configured with unusable settings.
    #[display("invalid source configuration")]
    Configuration,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network | Self::RateLimited | Self::DigestMismatch | Self::Io => true,
            Self::Status(code) => *code == 408 || *code >= 500,
            _ => false,
        }
    }

    /// Classify an HTTP status that was not a success.
    pub(crate) fn from_status(code: u16) -> Self {
        match code {
            404 | 410 => Self::NotFound,
            429 => Self::RateLimited,
            code => Self::Status(code),
        }
    }

    /// Classify a `reqwest` failure.
    pub(crate) fn from_reqwest(err: &reqwest::Error) -> Self {
        match err.status() {
            Some(status) => Self::from_status(status.as_u16()),
            None if err.is_decode() => Self::InvalidMetadata,
            None => Self::Network,
        }
    }

    /// Convert an archive error into a source error, preserving the archive
    /// crate's `Exn` frame as a child in its own error tree.
    #[track_caller]
    pub(crate) fn archive(err: ArchiveError) -> Error {
        let kind = match &*err {
            ArchiveErrorKind::TooManyEntries(_) | ArchiveErrorKind::TooLarge(_) => Self::TooLarge,
            ArchiveErrorKind::UnsupportedFormat(format) => Self::Unsupported(format.clone()),
            ArchiveErrorKind::Io => Self::Io,
            ArchiveErrorKind::InvalidData => Self::MalformedArtifact,
        };
        err.raise(kind)
    }
}

/// Attach an [`ErrorKind`] derived from the `reqwest` error itself.
pub(crate) trait HttpResultExt<T> {
    fn or_raise_http(self) -> Result<T>;
}

impl<T> HttpResultExt<T> for reqwest::Result<T> {
    #[track_caller]
    fn or_raise_http(self) -> Result<T> {
        use exn::ResultExt;
        match self {
            Ok(value) => Ok(value),
            Err(err) => {
                let kind = ErrorKind::from_reqwest(&err);
                Err(err).or_raise(|| kind)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ErrorKind::Network, true)]
    #[case(ErrorKind::RateLimited, true)]
    #[case(ErrorKind::DigestMismatch, true)]
    #[case(ErrorKind::Io, true)]
    #[case(ErrorKind::Status(503), true)]
    #[case(ErrorKind::Status(408), true)]
    #[case(ErrorKind::Status(403), false)]
    #[case(ErrorKind::NotFound, false)]
    #[case(ErrorKind::MalformedArtifact, false)]
    #[case(ErrorKind::Unsupported("exe".to_string()), false)]
    #[case(ErrorKind::TooLarge, false)]
    #[case(ErrorKind::InvalidMetadata, false)]
    fn test_retryable(#[case] kind: ErrorKind, #[case] retryable: bool) {
        assert_eq!(kind.is_retryable(), retryable);
    }

    #[rstest]
    #[case(404, ErrorKind::NotFound)]
    #[case(410, ErrorKind::NotFound)]
    #[case(429, ErrorKind::RateLimited)]
    #[case(500, ErrorKind::Status(500))]
    fn test_from_status(#[case] code: u16, #[case] expected: ErrorKind) {
        assert_eq!(ErrorKind::from_status(code), expected);
    }

    #[test]
    fn test_archive_errors_are_classified() {
        let err = ErrorKind::archive(exn::Exn::from(ArchiveErrorKind::TooManyEntries(5)));
        assert_eq!(*err, ErrorKind::TooLarge);
        let err = ErrorKind::archive(exn::Exn::from(ArchiveErrorKind::InvalidData));
        assert_eq!(*err, ErrorKind::MalformedArtifact);
        assert!(!err.is_retryable());
    }
}
