//! Database connection and pool management.

use exn::ResultExt;
use sqlx::SqliteConnection;
use sqlx::pool::PoolConnectionMetadata;
use sqlx::sqlite::{SqliteAutoVacuum, SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::path::Path;
use std::time::Duration;
use tracing::instrument;

use crate::error::{ErrorKind, Result};

/// Embedded migrations, applied on connect.
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
// One writer at a time under WAL anyway; the rest serve queries.
const MAX_CONNECTIONS: u32 = 8;

/// Connection pool for the index database.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    async fn new(options: SqliteConnectOptions, max: Option<u32>) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            // Runs for every pooled connection, not just the first one.
            .after_connect(|conn, meta| Box::pin(async move { Self::apply_pragmas(conn, meta).await }))
            .max_connections(max.unwrap_or(MAX_CONNECTIONS))
            .connect_with(options)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Open (or create) the index database at `path` and bring its schema up
    /// to date.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let options = Self::base_options().filename(path.as_ref()).create_if_missing(true);
        Self::new(options, None).await
    }

    /// Connect to a fresh in-memory database.
    ///
    /// Not behind `#[cfg(test)]`: other crates use it in their tests.
    pub async fn connect_in_memory() -> Result<Self> {
        let options = Self::base_options().filename(":memory:");
        // Every connection to ":memory:" is its own database.
        Self::new(options, Some(1)).await
    }

    fn base_options() -> SqliteConnectOptions {
        SqliteConnectOptions::new()
            // Readers never block on the crawler's write transactions.
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .synchronous(SqliteSynchronous::Normal)
            // Ingestion workers commit concurrently; they queue on the write
            // lock rather than failing with SQLITE_BUSY.
            .busy_timeout(Duration::from_secs(5))
            .auto_vacuum(SqliteAutoVacuum::None)
    }

    /// PRAGMAs that `SqliteConnectOptions` doesn't expose.
    async fn apply_pragmas(conn: &mut SqliteConnection, _meta: PoolConnectionMetadata) -> sqlx::Result<()> {
        sqlx::query(
            r#"
                PRAGMA wal_autocheckpoint = 1000;
                PRAGMA cache_size = -16384;
                PRAGMA temp_store = MEMORY;
                PRAGMA mmap_size = 268435456;
                PRAGMA analysis_limit = 1000;
            "#,
        )
        .execute(conn)
        .await?;
        Ok(())
    }

    #[instrument("performing database migrations", skip(self))]
    async fn migrate(&self) -> Result<()> {
        MIGRATOR.run(&self.pool).await.or_raise(|| ErrorKind::Migration)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Fold the write-ahead log back into the main database file, so that a
    /// plain copy of the file is a consistent snapshot.
    ///
    /// Returns the number of WAL frames checkpointed.
    #[instrument(skip(self))]
    pub async fn checkpoint(&self) -> Result<u64> {
        let (busy, _log, checkpointed): (i64, i64, i64) = sqlx::query_as("PRAGMA wal_checkpoint(TRUNCATE)")
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        if busy != 0 {
            tracing::warn!("WAL checkpoint could not complete; readers or writers are still active");
            exn::bail!(ErrorKind::Database);
        }
        Ok(u64::try_from(checkpointed).unwrap_or_default())
    }

    /// Close the pool, waiting for connections to be returned first.
    pub async fn close(&self) {
        // Refresh query planner statistics on the way out.
        _ = sqlx::query("PRAGMA optimize").execute(&self.pool).await;
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_in_memory() {
        let db = Database::connect_in_memory().await.unwrap();
        assert!(!db.pool().is_closed());
        db.close().await;
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let db = Database::connect_in_memory().await.unwrap();
        db.migrate().await.unwrap();
        db.close().await;
    }

    #[tokio::test]
    async fn test_pragmas_are_applied() {
        let db = Database::connect_in_memory().await.unwrap();
        let row: (i64,) = sqlx::query_as("PRAGMA foreign_keys").fetch_one(db.pool()).await.unwrap();
        assert_eq!(row.0, 1, "foreign_keys should be ON");
        let row: (i64,) = sqlx::query_as("PRAGMA wal_autocheckpoint").fetch_one(db.pool()).await.unwrap();
        assert_eq!(row.0, 1000);
        db.close().await;
    }

    #[tokio::test]
    async fn test_checkpoint_on_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::connect(dir.path().join("index.db")).await.unwrap();
        sqlx::query("INSERT INTO watermarks (ecosystem, cursor, updated_at) VALUES ('pypi', '0:a', 0)")
            .execute(db.pool())
            .await
            .unwrap();
        db.checkpoint().await.unwrap();
        db.close().await;
    }
}
