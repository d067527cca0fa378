//! Path and hash normalization for untrusted package manifests.
//!
//! Everything here is pure: the same input always produces the same output
//! and nothing touches the network, disk or database. Archive contents are
//! treated as hostile, so every raw path goes through [`normalize_path`]
//! before it can become a lookup key, and every declared hash is checked by
//! [`select_hash`] before it is trusted.
//!
//! Files that cannot be normalized are *skipped*, never fatal: a
//! [`SkipReason`] explains why, and the rest of the package is still indexed.

mod hash;
mod manifest;
mod name;
mod path;

pub use crate::hash::{decode_declared, select_hash};
pub use crate::manifest::{NormalizedManifest, Skipped, normalize_manifest};
pub use crate::name::{canonical_name, derive_import_names};
pub use crate::path::{common_root, normalize_path, strip_archive_root};
use derive_more::{Display, Error};

/// Why a manifest entry was excluded from the index.
#[derive(Clone, Copy, Debug, Display, Error, PartialEq, Eq, Hash)]
pub enum SkipReason {
    /// Directories are implied by the files inside them.
    #[display("directory")]
    Directory,
    /// The path climbs out of the package root.
    #[display("path escapes package root")]
    Traversal,
    /// The path normalizes to nothing (`""`, `"."`, `"//"`).
    #[display("empty path")]
    Empty,
    /// NUL bytes, or bytes that did not survive UTF-8 decoding.
    #[display("invalid bytes in path")]
    InvalidBytes,
    /// Neither a valid declared hash nor a computed hash is available.
    #[display("no usable content hash")]
    MissingHash,
}
