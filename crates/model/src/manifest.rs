use crate::file::FileType;
use crate::hash::ContentHash;
use serde::{Deserialize, Serialize};

/// A hash as declared by upstream metadata, *before* validation.
///
/// Declared hashes are untrusted: the algorithm label may be unknown and the
/// value may be hex or (as in wheel `RECORD` files) unpadded URL-safe base64.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredHash {
    pub algorithm: String,
    pub value: String,
}

impl DeclaredHash {
    pub fn new(algorithm: impl Into<String>, value: impl Into<String>) -> Self {
        Self { algorithm: algorithm.into(), value: value.into() }
    }

    /// Parse the `algorithm=value` form used by wheel `RECORD` files.
    pub fn from_record(field: &str) -> Option<Self> {
        let (algorithm, value) = field.split_once('=')?;
        match algorithm.is_empty() || value.is_empty() {
            true => None,
            false => Some(Self::new(algorithm, value)),
        }
    }
}

/// One member of an artifact, exactly as the archive reported it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Archive-internal path, not yet normalized.
    pub raw_path: String,
    pub declared: Option<DeclaredHash>,
    /// Hash computed from the bytes actually read out of the archive.
    pub computed: Option<ContentHash>,
    /// Secondary SHA-1 digest of the same bytes.
    pub sha1: Option<ContentHash>,
    pub size: u64,
    pub file_type: FileType,
}

impl ManifestEntry {
    pub fn regular(raw_path: impl Into<String>, size: u64) -> Self {
        Self {
            raw_path: raw_path.into(),
            declared: None,
            computed: None,
            sha1: None,
            size,
            file_type: FileType::Regular,
        }
    }

    pub fn with_declared(mut self, declared: DeclaredHash) -> Self {
        self.declared = Some(declared);
        self
    }

    pub fn with_computed(mut self, computed: ContentHash) -> Self {
        self.computed = Some(computed);
        self
    }

    pub fn with_sha1(mut self, sha1: ContentHash) -> Self {
        self.sha1 = Some(sha1);
        self
    }

    pub fn with_file_type(mut self, file_type: FileType) -> Self {
        self.file_type = file_type;
        self
    }
}

/// The listing of an artifact's contents.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub entries: Vec<ManifestEntry>,
    /// Wrapper directory every member lives under (source distributions ship
    /// as `name-version/...`); stripped during normalization.
    pub archive_root: Option<String>,
}

impl Manifest {
    pub fn new(entries: Vec<ManifestEntry>) -> Self {
        Self { entries, archive_root: None }
    }

    pub fn with_archive_root(mut self, root: impl Into<String>) -> Self {
        self.archive_root = Some(root.into());
        self
    }
}
