use crate::error::{Error, ErrorKind};
use crate::hash::ContentHash;
use crate::package::PackageKey;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of archive member. Directories appear in manifests but are never
/// indexed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    #[default]
    Regular,
    Symlink,
    Directory,
}

impl FileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Regular => "regular",
            Self::Symlink => "symlink",
            Self::Directory => "directory",
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileType {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "regular" => Ok(Self::Regular),
            "symlink" => Ok(Self::Symlink),
            "directory" => Ok(Self::Directory),
            _ => exn::bail!(ErrorKind::UnknownFileType(s.to_string())),
        }
    }
}

/// A normalized, hashed file belonging to a package.
///
/// Immutable once written: re-ingestion replaces the whole set rather than
/// editing entries in place.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileEntry {
    /// Normalized path, relative to the package root.
    pub path: String,
    pub hash: ContentHash,
    /// SHA-1 of the same bytes, when the archive was read to compute it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha1: Option<ContentHash>,
    pub size: u64,
    pub file_type: FileType,
}

/// A query hit: which package ships which file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMatch {
    pub package: PackageKey,
    #[serde(flatten)]
    pub file: FileEntry,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(FileType::Regular)]
    #[case(FileType::Symlink)]
    #[case(FileType::Directory)]
    fn test_file_type_labels(#[case] file_type: FileType) {
        assert_eq!(file_type.as_str().parse::<FileType>().unwrap(), file_type);
    }

    #[test]
    fn test_unknown_file_type() {
        assert!("fifo".parse::<FileType>().is_err());
    }
}
