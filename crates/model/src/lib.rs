//! Shared data model for the package file index.
//!
//! Every other crate in the workspace speaks in these types:
//! - **Packages** are identified by `(ecosystem, name, version)` and carry the
//!   ingestion state machine ([`PackageStatus`]).
//! - **File entries** are the normalized, hash-tagged contents of a package.
//! - **Manifests** are the raw, untrusted listing a source hands back before
//!   normalization.
//! - **Cursors** are opaque discovery positions owned by a source adapter.

pub mod error;
mod file;
mod hash;
mod manifest;
mod package;

pub use crate::file::{FileEntry, FileMatch, FileType};
pub use crate::hash::{ContentHash, HashAlgorithm};
pub use crate::manifest::{DeclaredHash, Manifest, ManifestEntry};
pub use crate::package::{Artifact, Cursor, Ecosystem, Package, PackageId, PackageKey, PackageStatus, ReleaseRef};
