use crate::error::{Error, ErrorKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;

/// A package-hosting system.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ecosystem {
    Pypi,
}

impl Ecosystem {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pypi => "pypi",
        }
    }
}

impl fmt::Display for Ecosystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Ecosystem {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pypi" => Ok(Self::Pypi),
            _ => exn::bail!(ErrorKind::UnknownEcosystem(s.to_string())),
        }
    }
}

/// Identity of a package release: `(ecosystem, name, version)`.
///
/// The name is expected to already be in the ecosystem's canonical form (see
/// `filedex_normalize::canonical_name`); this type does not re-normalize.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PackageKey {
    pub ecosystem: Ecosystem,
    pub name: String,
    pub version: String,
}

impl PackageKey {
    pub fn new(ecosystem: Ecosystem, name: impl Into<String>, version: impl Into<String>) -> Self {
        Self { ecosystem, name: name.into(), version: version.into() }
    }
}

impl fmt::Display for PackageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}", self.ecosystem, self.name, self.version)
    }
}

/// Database surrogate key for a package row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackageId(pub i64);

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Ingestion state of a package.
///
/// ```text
/// pending ──► fetching ──► ingested
///                │  ▲
///                ▼  │ (retry, bounded)
///              failed ──► failed(permanent)
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum PackageStatus {
    /// Discovered, not yet attempted (or returned after an interrupted attempt).
    Pending,
    /// Claimed by an ingestion worker.
    Fetching,
    /// File set committed and visible to queries.
    Ingested,
    /// Last attempt failed. Permanent failures are never retried automatically.
    Failed { permanent: bool },
}

impl PackageStatus {
    /// Storage label; `permanent` is stored separately.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Fetching => "fetching",
            Self::Ingested => "ingested",
            Self::Failed { .. } => "failed",
        }
    }

    /// `true` for states no automatic process will move out of.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ingested | Self::Failed { permanent: true })
    }

    /// Reassemble a status from its storage label and permanence flag.
    pub fn from_parts(label: &str, permanent: bool) -> crate::error::Result<Self> {
        match label {
            "pending" => Ok(Self::Pending),
            "fetching" => Ok(Self::Fetching),
            "ingested" => Ok(Self::Ingested),
            "failed" => Ok(Self::Failed { permanent }),
            _ => exn::bail!(ErrorKind::UnknownStatus(label.to_string())),
        }
    }
}

impl fmt::Display for PackageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed { permanent: true } => f.write_str("failed (permanent)"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// The distribution file chosen to represent a release.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub filename: String,
    /// Upstream-declared SHA-256 of the whole artifact (lowercase hex).
    pub sha256: Option<String>,
    pub size: Option<u64>,
}

/// A release as reported by a source during discovery.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseRef {
    pub key: PackageKey,
    /// Where the artifact can be downloaded from.
    pub url: String,
    pub artifact: Artifact,
    #[serde(with = "time::serde::rfc3339::option")]
    pub released_at: Option<OffsetDateTime>,
    pub yanked: bool,
}

/// A package row as persisted by the index.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    pub id: PackageId,
    pub key: PackageKey,
    pub url: String,
    pub artifact: Artifact,
    #[serde(with = "time::serde::rfc3339::option")]
    pub released_at: Option<OffsetDateTime>,
    pub yanked: bool,
    pub status: PackageStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub next_attempt_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub discovered_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Package {
    /// The release this row was created from.
    pub fn release(&self) -> ReleaseRef {
        ReleaseRef {
            key: self.key.clone(),
            url: self.url.clone(),
            artifact: self.artifact.clone(),
            released_at: self.released_at,
            yanked: self.yanked,
        }
    }
}

/// Opaque discovery position. Only the source adapter that produced a cursor
/// knows how to interpret it; everyone else just stores and hands it back.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(pub String);

impl Cursor {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
