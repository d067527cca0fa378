use crate::error::{Error, ErrorKind};
use exn::ResultExt;
use filedex_model::{ContentHash, Ecosystem, FileEntry, FileMatch, FileType, HashAlgorithm, PackageKey};

#[derive(sqlx::FromRow)]
pub(crate) struct FileRow {
    pub(crate) path: String,
    pub(crate) hash: String,
    pub(crate) sha1: Option<String>,
    pub(crate) size: i64,
    pub(crate) file_type: String,
}
impl TryFrom<&FileEntry> for FileRow {
    type Error = Error;
    fn try_from(entry: &FileEntry) -> Result<Self, Self::Error> {
        if entry.file_type == FileType::Directory {
            exn::bail!(ErrorKind::InvalidData("directories are not indexed"));
        }
        // A file only ever known by a declared SHA-1 is still found by it.
        let sha1 = match (&entry.sha1, entry.hash.algorithm()) {
            (Some(sha1), _) => Some(sha1.to_string()),
            (None, HashAlgorithm::Sha1) => Some(entry.hash.to_string()),
            (None, _) => None,
        };
        Ok(Self {
            path: entry.path.clone(),
            hash: entry.hash.to_string(),
            sha1,
            size: i64::try_from(entry.size).or_raise(|| ErrorKind::InvalidData("file size"))?,
            file_type: entry.file_type.as_str().to_string(),
        })
    }
}
impl TryFrom<FileRow> for FileEntry {
    type Error = Error;
    fn try_from(row: FileRow) -> Result<Self, Self::Error> {
        Ok(Self {
            path: row.path,
            hash: row.hash.parse::<ContentHash>().or_raise(|| ErrorKind::InvalidData("hash"))?,
            sha1: row
                .sha1
                .filter(|sha1| *sha1 != row.hash)
                .map(|sha1| sha1.parse::<ContentHash>())
                .transpose()
                .or_raise(|| ErrorKind::InvalidData("sha1"))?,
            size: u64::try_from(row.size).or_raise(|| ErrorKind::InvalidData("file size"))?,
            file_type: row.file_type.parse::<FileType>().or_raise(|| ErrorKind::InvalidData("file type"))?,
        })
    }
}

/// A file joined with the key of the package that ships it.
#[derive(sqlx::FromRow)]
pub(crate) struct MatchRow {
    ecosystem: String,
    name: String,
    version: String,
    #[sqlx(flatten)]
    file: FileRow,
}
impl TryFrom<MatchRow> for FileMatch {
    type Error = Error;
    fn try_from(row: MatchRow) -> Result<Self, Self::Error> {
        let ecosystem: Ecosystem = row.ecosystem.parse::<Ecosystem>().or_raise(|| ErrorKind::InvalidData("ecosystem"))?;
        Ok(Self {
            package: PackageKey::new(ecosystem, row.name, row.version),
            file: FileEntry::try_from(row.file)?,
        })
    }
}
