use filedex_model::{FileMatch, PackageKey};
use serde::{Deserialize, Serialize};

/// Outcome of writing one package's file set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct WriteSummary {
    pub files: usize,
    pub import_names: usize,
}

/// Keyset position in a prefix listing: resume strictly after this match.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefixCursor {
    pub path: String,
    pub package: PackageKey,
}

impl From<&FileMatch> for PrefixCursor {
    fn from(m: &FileMatch) -> Self {
        Self { path: m.file.path.clone(), package: m.package.clone() }
    }
}

/// Index-wide counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub pending: u64,
    pub fetching: u64,
    pub ingested: u64,
    /// Failed, will be retried.
    pub failed: u64,
    pub failed_permanent: u64,
    /// Failed packages whose retry time has already passed.
    pub retry_due: u64,
    pub files: u64,
    pub import_names: u64,
}

impl Stats {
    pub fn packages(&self) -> u64 {
        self.pending + self.fetching + self.ingested + self.failed + self.failed_permanent
    }
}
