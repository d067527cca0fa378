//! SQLite index of package contents.
//!
//! The index is the single source of truth for crawl state: which releases
//! are known, where each one is in the ingestion state machine, and (for
//! ingested releases) every file they ship.
//!
//! # Architecture
//! - **packages**: one row per `(ecosystem, name, version)`, carrying the
//!   selected artifact and ingestion status.
//! - **files**: normalized path, tagged content hash (plus a secondary SHA-1
//!   where one was computed), size and type. Only ever present for `ingested`
//!   packages, and always replaced as a set.
//! - **imports**: top-level Python import names derived from `files`, kept in
//!   step with them inside the same transaction.
//! - **watermarks**: the last discovery cursor per ecosystem.
//!
//! Lookups by either hash and by path prefix go through plain B-tree indexes
//! on `files`; both are maintained by SQLite in the writing transaction, so a
//! reader never sees a half-written package.

mod db;
pub mod error;
mod models;
mod store;

pub use crate::db::Database;
pub use crate::models::{PrefixCursor, Stats, WriteSummary};
pub use crate::store::IndexStore;
