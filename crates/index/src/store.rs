//! Package, file and import-name repository.
//!
//! All status changes go through here, and every one that affects what
//! queries can see (`write_files`, `mark_status`) happens in a single
//! transaction together with the file and import-name rows it implies.

use crate::Database;
use crate::error::{ErrorKind, Result};
use crate::models::{FileRow, MatchRow, NewPackageRow, PackageRow, PrefixCursor, Stats, WriteSummary, timestamp};
use exn::ResultExt;
use filedex_model::{
    ContentHash, Cursor, Ecosystem, FileEntry, FileMatch, HashAlgorithm, Package, PackageId, PackageKey,
    PackageStatus, ReleaseRef,
};
use filedex_normalize::derive_import_names;
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::time::Duration;
use time::OffsetDateTime;
use tracing::instrument;

/// A `fetching` claim untouched for this long belongs to a worker that died.
///
/// Comfortably longer than a fetch can take (download timeout plus archive
/// enumeration).
const STALE_CLAIM: Duration = Duration::from_secs(30 * 60);

/// Upper bound for a prefix with no successor.
const UNBOUNDED_PATH: &[u8] = &[0xFF];

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

/// Smallest string greater than every string starting with `prefix`, or
/// `None` when no such string exists (the prefix is all `char::MAX`).
pub(crate) fn successor(prefix: &str) -> Option<String> {
    let mut chars: Vec<char> = prefix.chars().collect();
    while let Some(last) = chars.pop() {
        let next = match last {
            '\u{D7FF}' => Some('\u{E000}'),
            c => char::from_u32(u32::from(c) + 1),
        };
        if let Some(next) = next {
            chars.push(next);
            return Some(chars.into_iter().collect());
        }
    }
    None
}

#[derive(Debug, Clone)]
pub struct IndexStore {
    pool: SqlitePool,
}
impl From<&Database> for IndexStore {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone() }
    }
}
impl IndexStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn begin(&self) -> Result<Transaction<'_, Sqlite>> {
        self.pool.begin().await.or_raise(|| ErrorKind::Database)
    }

    /// Remove a package's files and import names. Used whenever it leaves
    /// (or is about to re-enter) the `ingested` state.
    async fn clear_files(tx: &mut Transaction<'_, Sqlite>, id: PackageId) -> Result<()> {
        sqlx::query(include_str!("../queries/delete_files.sql"))
            .bind(id.0)
            .execute(&mut **tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        sqlx::query(include_str!("../queries/delete_imports.sql"))
            .bind(id.0)
            .execute(&mut **tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    async fn insert_imports<'p>(
        tx: &mut Transaction<'_, Sqlite>,
        id: PackageId,
        paths: impl IntoIterator<Item = &'p str>,
    ) -> Result<usize> {
        let names = derive_import_names(paths);
        for name in &names {
            sqlx::query(include_str!("../queries/insert_import.sql"))
                .bind(name)
                .bind(id.0)
                .execute(&mut **tx)
                .await
                .or_raise(|| ErrorKind::Database)?;
        }
        Ok(names.len())
    }

    // =========================================================================
    // Packages
    // =========================================================================

    /// Record a discovered release, returning its id.
    ///
    /// Idempotent on `(ecosystem, name, version)`. Re-discovery refreshes the
    /// yanked flag; the artifact is only replaced while the package has not
    /// been ingested from it yet.
    #[instrument(skip(self, release), fields(package = %release.key))]
    pub async fn upsert_package(&self, release: &ReleaseRef) -> Result<PackageId> {
        let row = NewPackageRow::try_from(release)?;
        let id: i64 = sqlx::query_scalar(include_str!("../queries/upsert_package.sql"))
            .bind(row.ecosystem)
            .bind(row.name)
            .bind(row.version)
            .bind(row.url)
            .bind(row.artifact_name)
            .bind(row.artifact_sha256)
            .bind(row.artifact_size)
            .bind(row.released_at)
            .bind(row.yanked)
            .bind(timestamp(OffsetDateTime::now_utc()))
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(PackageId(id))
    }

    pub async fn get_package(&self, key: &PackageKey) -> Result<Option<Package>> {
        let row: Option<PackageRow> = sqlx::query_as(include_str!("../queries/get_package.sql"))
            .bind(key.ecosystem.as_str())
            .bind(&key.name)
            .bind(&key.version)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(Package::try_from).transpose()
    }

    pub async fn get_package_by_id(&self, id: PackageId) -> Result<Option<Package>> {
        let row: Option<PackageRow> = sqlx::query_as(include_str!("../queries/get_package_by_id.sql"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(Package::try_from).transpose()
    }

    /// Packages due for an ingestion attempt at `now`, oldest first.
    ///
    /// That is everything `pending`, retryable failures whose back-off has
    /// elapsed, and `fetching` claims abandoned by a worker that went away.
    #[instrument(skip(self))]
    pub async fn backlog(&self, now: OffsetDateTime, limit: usize) -> Result<Vec<Package>> {
        let rows: Vec<PackageRow> = sqlx::query_as(include_str!("../queries/backlog.sql"))
            .bind(timestamp(now))
            .bind(timestamp(now - STALE_CLAIM))
            .bind(sql_limit(limit))
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(Package::try_from).collect()
    }

    // =========================================================================
    // Status transitions
    // =========================================================================

    /// Move a package to `fetching`, counting the attempt.
    ///
    /// Returns the attempt number, or `None` if the package is already
    /// ingested, permanently failed, or doesn't exist.
    #[instrument(skip(self))]
    pub async fn claim(&self, id: PackageId) -> Result<Option<u32>> {
        let attempts: Option<i64> = sqlx::query_scalar(include_str!("../queries/claim.sql"))
            .bind(id.0)
            .bind(timestamp(OffsetDateTime::now_utc()))
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        attempts.map(|a| u32::try_from(a).or_raise(|| ErrorKind::InvalidData("attempts"))).transpose()
    }

    /// Hand an interrupted claim back to `pending`. The attempt it used is
    /// not counted.
    #[instrument(skip(self))]
    pub async fn release_claim(&self, id: PackageId) -> Result<()> {
        sqlx::query(include_str!("../queries/release_claim.sql"))
            .bind(id.0)
            .bind(timestamp(OffsetDateTime::now_utc()))
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    /// Record a transient failure: `failed`, not permanent, eligible again at
    /// `at`.
    #[instrument(skip(self))]
    pub async fn schedule_retry(&self, id: PackageId, error: &str, at: OffsetDateTime) -> Result<()> {
        let result = sqlx::query(include_str!("../queries/schedule_retry.sql"))
            .bind(id.0)
            .bind(error)
            .bind(timestamp(at))
            .bind(timestamp(OffsetDateTime::now_utc()))
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        if result.rows_affected() == 0 {
            exn::bail!(ErrorKind::NotFound(id));
        }
        Ok(())
    }

    /// Set any status other than `ingested` (which only
    /// [`write_files()`](Self::write_files) can reach).
    ///
    /// The package's files and import names are removed in the same
    /// transaction. Moving to `pending` also resets the attempt count.
    #[instrument(skip(self))]
    pub async fn mark_status(&self, id: PackageId, status: PackageStatus, error: Option<&str>) -> Result<()> {
        let permanent = match status {
            PackageStatus::Ingested => exn::bail!(ErrorKind::InvalidTransition(id)),
            PackageStatus::Failed { permanent } => permanent,
            PackageStatus::Pending | PackageStatus::Fetching => false,
        };
        let mut tx = self.begin().await?;
        let result = sqlx::query(include_str!("../queries/set_status.sql"))
            .bind(id.0)
            .bind(status.as_str())
            .bind(permanent)
            .bind(error)
            .bind(timestamp(OffsetDateTime::now_utc()))
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        if result.rows_affected() == 0 {
            exn::bail!(ErrorKind::NotFound(id));
        }
        Self::clear_files(&mut tx, id).await?;
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    // =========================================================================
    // Files
    // =========================================================================

    /// Replace a package's file set and mark it `ingested`.
    ///
    /// All-or-nothing: the old files and import names are deleted, the new
    /// ones inserted, and the status flipped in one transaction. If the
    /// transaction is dropped part-way (error, cancellation) nothing changes.
    #[instrument(skip(self, files), fields(files = files.len()))]
    pub async fn write_files(&self, id: PackageId, files: &[FileEntry]) -> Result<WriteSummary> {
        let rows = files.iter().map(FileRow::try_from).collect::<Result<Vec<_>>>()?;
        let mut tx = self.begin().await?;
        let result = sqlx::query(include_str!("../queries/set_ingested.sql"))
            .bind(id.0)
            .bind(timestamp(OffsetDateTime::now_utc()))
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        if result.rows_affected() == 0 {
            exn::bail!(ErrorKind::NotFound(id));
        }
        Self::clear_files(&mut tx, id).await?;
        for row in &rows {
            sqlx::query(include_str!("../queries/insert_file.sql"))
                .bind(id.0)
                .bind(&row.path)
                .bind(&row.hash)
                .bind(&row.sha1)
                .bind(row.size)
                .bind(&row.file_type)
                .execute(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Database)?;
        }
        let import_names = Self::insert_imports(&mut tx, id, rows.iter().map(|r| r.path.as_str())).await?;
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        Ok(WriteSummary { files: rows.len(), import_names })
    }

    /// Files of an ingested package, ordered by path. Empty if the package is
    /// unknown or not ingested.
    pub async fn list_package_files(&self, key: &PackageKey) -> Result<Vec<FileEntry>> {
        let rows: Vec<FileRow> = sqlx::query_as(include_str!("../queries/list_package_files.sql"))
            .bind(key.ecosystem.as_str())
            .bind(&key.name)
            .bind(&key.version)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(FileEntry::try_from).collect()
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    /// Every ingested file with exactly this content.
    ///
    /// SHA-256 hashes are matched against each file's primary hash, SHA-1
    /// hashes against its secondary digest.
    #[instrument(skip(self, hash), fields(hash = %hash))]
    pub async fn query_by_hash(&self, hash: &ContentHash, limit: usize) -> Result<Vec<FileMatch>> {
        let sql = match hash.algorithm() {
            HashAlgorithm::Sha256 => include_str!("../queries/query_by_hash.sql"),
            HashAlgorithm::Sha1 => include_str!("../queries/query_by_sha1.sql"),
        };
        let rows: Vec<MatchRow> = sqlx::query_as(sql)
            .bind(hash.to_string())
            .bind(sql_limit(limit))
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(FileMatch::try_from).collect()
    }

    /// Ingested files whose path starts with `prefix`, ordered by path then
    /// package name then version, continuing strictly after `after`.
    ///
    /// The prefix is matched byte-for-byte (no `LIKE`), as a range scan over
    /// the path index that starts at the cursor rather than at the prefix.
    #[instrument(skip(self, after))]
    pub async fn query_by_prefix(
        &self,
        prefix: &str,
        after: Option<&PrefixCursor>,
        limit: usize,
    ) -> Result<Vec<FileMatch>> {
        let (after_path, after_name, after_version, after_ecosystem) = match after {
            Some(cursor) => (
                cursor.path.as_str(),
                cursor.package.name.as_str(),
                cursor.package.version.as_str(),
                cursor.package.ecosystem.as_str(),
            ),
            // Sorts before every real row at or after `prefix`.
            None => (prefix, "", "", ""),
        };
        let lower = after_path.max(prefix);
        let query = sqlx::query_as(include_str!("../queries/query_by_prefix.sql")).bind(lower);
        let query = match successor(prefix) {
            Some(upper) => query.bind(upper),
            // SQLite orders every BLOB after every TEXT value.
            None => query.bind(UNBOUNDED_PATH.to_vec()),
        };
        let rows: Vec<MatchRow> = query
            .bind(after_path)
            .bind(after_name)
            .bind(after_version)
            .bind(after_ecosystem)
            .bind(sql_limit(limit))
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(FileMatch::try_from).collect()
    }

    /// Ingested packages providing a top-level import `name`.
    #[instrument(skip(self))]
    pub async fn query_by_import_name(&self, name: &str, limit: usize) -> Result<Vec<PackageKey>> {
        let rows: Vec<(String, String, String)> = sqlx::query_as(include_str!("../queries/query_by_import_name.sql"))
            .bind(name)
            .bind(sql_limit(limit))
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter()
            .map(|(ecosystem, name, version)| {
                let ecosystem: Ecosystem = ecosystem.parse::<Ecosystem>().or_raise(|| ErrorKind::InvalidData("ecosystem"))?;
                Ok(PackageKey::new(ecosystem, name, version))
            })
            .collect()
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Recompute every import name from the stored file paths.
    ///
    /// Returns the number of `(name, package)` rows written.
    #[instrument(skip(self))]
    pub async fn rebuild_import_names(&self) -> Result<u64> {
        let mut tx = self.begin().await?;
        sqlx::query("DELETE FROM imports").execute(&mut *tx).await.or_raise(|| ErrorKind::Database)?;
        let ids: Vec<i64> = sqlx::query_scalar(include_str!("../queries/list_ingested_ids.sql"))
            .fetch_all(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let mut written = 0u64;
        for id in ids {
            let paths: Vec<String> = sqlx::query_scalar(include_str!("../queries/list_paths.sql"))
                .bind(id)
                .fetch_all(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Database)?;
            written += Self::insert_imports(&mut tx, PackageId(id), paths.iter().map(String::as_str)).await? as u64;
        }
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        tracing::info!(rows = written, "Rebuilt import names");
        Ok(written)
    }

    pub async fn stats(&self) -> Result<Stats> {
        let counts: (i64, i64, i64, i64, i64, i64, i64, i64) = sqlx::query_as(include_str!("../queries/stats.sql"))
            .bind(timestamp(OffsetDateTime::now_utc()))
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let count = |n: i64| u64::try_from(n).or_raise(|| ErrorKind::InvalidData("count"));
        Ok(Stats {
            pending: count(counts.0)?,
            fetching: count(counts.1)?,
            ingested: count(counts.2)?,
            failed: count(counts.3)?,
            failed_permanent: count(counts.4)?,
            retry_due: count(counts.5)?,
            files: count(counts.6)?,
            import_names: count(counts.7)?,
        })
    }

    // =========================================================================
    // Watermarks
    // =========================================================================

    pub async fn watermark(&self, ecosystem: Ecosystem) -> Result<Option<Cursor>> {
        let cursor: Option<String> = sqlx::query_scalar(include_str!("../queries/get_watermark.sql"))
            .bind(ecosystem.as_str())
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(cursor.map(Cursor))
    }

    #[instrument(skip(self))]
    pub async fn set_watermark(&self, ecosystem: Ecosystem, cursor: &Cursor) -> Result<()> {
        sqlx::query(include_str!("../queries/set_watermark.sql"))
            .bind(ecosystem.as_str())
            .bind(cursor.as_str())
            .bind(timestamp(OffsetDateTime::now_utc()))
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }
}
