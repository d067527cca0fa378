use crate::error::{Error, ErrorKind};
use exn::ResultExt;
use filedex_model::{Artifact, Ecosystem, Package, PackageId, PackageKey, PackageStatus, ReleaseRef};
use time::OffsetDateTime;

pub(crate) fn timestamp(at: OffsetDateTime) -> i64 {
    at.unix_timestamp()
}

fn from_timestamp(ts: i64, field: &'static str) -> Result<OffsetDateTime, Error> {
    OffsetDateTime::from_unix_timestamp(ts).or_raise(|| ErrorKind::InvalidData(field))
}

/// Columns written when a release is discovered.
pub(crate) struct NewPackageRow {
    pub(crate) ecosystem: &'static str,
    pub(crate) name: String,
    pub(crate) version: String,
    pub(crate) url: String,
    pub(crate) artifact_name: String,
    pub(crate) artifact_sha256: Option<String>,
    pub(crate) artifact_size: Option<i64>,
    pub(crate) released_at: Option<i64>,
    pub(crate) yanked: bool,
}
impl TryFrom<&ReleaseRef> for NewPackageRow {
    type Error = Error;
    fn try_from(release: &ReleaseRef) -> Result<Self, Self::Error> {
        Ok(Self {
            ecosystem: release.key.ecosystem.as_str(),
            name: release.key.name.clone(),
            version: release.key.version.clone(),
            url: release.url.clone(),
            artifact_name: release.artifact.filename.clone(),
            artifact_sha256: release.artifact.sha256.clone(),
            artifact_size: release
                .artifact
                .size
                .map(i64::try_from)
                .transpose()
                .or_raise(|| ErrorKind::InvalidData("artifact size"))?,
            released_at: release.released_at.map(timestamp),
            yanked: release.yanked,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct PackageRow {
    id: i64,
    ecosystem: String,
    name: String,
    version: String,
    url: String,
    artifact_name: String,
    artifact_sha256: Option<String>,
    artifact_size: Option<i64>,
    released_at: Option<i64>,
    yanked: bool,
    status: String,
    permanent: bool,
    attempts: i64,
    last_error: Option<String>,
    next_attempt_at: Option<i64>,
    discovered_at: i64,
    updated_at: i64,
}
impl TryFrom<PackageRow> for Package {
    type Error = Error;
    fn try_from(row: PackageRow) -> Result<Self, Self::Error> {
        let ecosystem: Ecosystem = row.ecosystem.parse::<Ecosystem>().or_raise(|| ErrorKind::InvalidData("ecosystem"))?;
        Ok(Self {
            id: PackageId(row.id),
            key: PackageKey::new(ecosystem, row.name, row.version),
            url: row.url,
            artifact: Artifact {
                filename: row.artifact_name,
                sha256: row.artifact_sha256,
                size: row
                    .artifact_size
                    .map(u64::try_from)
                    .transpose()
                    .or_raise(|| ErrorKind::InvalidData("artifact size"))?,
            },
            released_at: row.released_at.map(|ts| from_timestamp(ts, "release date")).transpose()?,
            yanked: row.yanked,
            status: PackageStatus::from_parts(&row.status, row.permanent)
                .or_raise(|| ErrorKind::InvalidData("status"))?,
            attempts: u32::try_from(row.attempts).or_raise(|| ErrorKind::InvalidData("attempts"))?,
            last_error: row.last_error,
            next_attempt_at: row.next_attempt_at.map(|ts| from_timestamp(ts, "next attempt")).transpose()?,
            discovered_at: from_timestamp(row.discovered_at, "discovery date")?,
            updated_at: from_timestamp(row.updated_at, "update date")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> PackageRow {
        PackageRow {
            id: 7,
            ecosystem: "pypi".to_string(),
            name: "demo".to_string(),
            version: "1.0".to_string(),
            url: "https://files.example/demo-1.0.tar.gz".to_string(),
            artifact_name: "demo-1.0.tar.gz".to_string(),
            artifact_sha256: None,
            artifact_size: Some(1024),
            released_at: None,
            yanked: false,
            status: "failed".to_string(),
            permanent: true,
            attempts: 5,
            last_error: Some("not found upstream".to_string()),
            next_attempt_at: None,
            discovered_at: 1_700_000_000,
            updated_at: 1_700_000_500,
        }
    }

    #[test]
    fn test_row_to_model() {
        let package = Package::try_from(row()).unwrap();
        assert_eq!(package.id, PackageId(7));
        assert_eq!(package.key.to_string(), "pypi:demo-1.0");
        assert_eq!(package.status, PackageStatus::Failed { permanent: true });
        assert_eq!(package.artifact.size, Some(1024));
        assert_eq!(package.updated_at.unix_timestamp(), 1_700_000_500);
    }

    #[test]
    fn test_row_with_unknown_status() {
        let row = PackageRow { status: "exploded".to_string(), ..row() };
        let err = Package::try_from(row).unwrap_err();
        assert_eq!(*err, ErrorKind::InvalidData("status"));
    }

    #[test]
    fn test_row_with_negative_attempts() {
        let row = PackageRow { attempts: -1, ..row() };
        assert!(Package::try_from(row).is_err());
    }
}
