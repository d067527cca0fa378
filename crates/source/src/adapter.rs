//! Source adapter trait.

use crate::error::Result;
use async_trait::async_trait;
use filedex_model::{Cursor, Ecosystem, Manifest, ReleaseRef};
use futures::{Stream, TryStreamExt};
use std::pin::Pin;

pub type ReleaseStream<'a> = Pin<Box<dyn Stream<Item = Result<Discovered>> + Send + 'a>>;

/// One step of discovery.
///
/// `release` is `None` when the source looked at something that has nothing
/// indexable (a project with no files, or with only installers we can't
/// read). The cursor still advances past it so it isn't looked at again
/// until the next pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Discovered {
    pub release: Option<ReleaseRef>,
    /// Resuming discovery from this cursor continues *after* this item.
    pub cursor: Cursor,
}

/// Unified interface for package ecosystems.
///
/// Implementations must treat everything they download as untrusted: bound
/// memory by streaming, cap archive sizes, and never extract to disk.
///
/// # Errors
/// Every error carries an [`ErrorKind`](crate::error::ErrorKind) that says
/// whether retrying could help. The coordinator relies on that distinction
/// to decide between backing off and giving up on a package.
///
/// # Examples
///
/// ```no_run
/// use futures::TryStreamExt;
/// use filedex_source::{SourceAdapter, error::Result};
///
/// async fn print_new_releases(source: &dyn SourceAdapter) -> Result<()> {
///     let mut stream = source.discover(None);
///     while let Some(step) = stream.try_next().await? {
///         if let Some(release) = step.release {
///             let manifest = source.fetch_manifest(&release).await?;
///             println!("{}: {} files (resume at {})", release.key, manifest.entries.len(), step.cursor);
///         }
///     }
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// The ecosystem every [`ReleaseRef`] from this adapter belongs to.
    fn ecosystem(&self) -> Ecosystem;

    /// Stream releases after `cursor` (from the beginning when `None`).
    ///
    /// The stream is finite per call. Each item carries the cursor to resume
    /// from, and cursors only ever move forward. An `Err` item ends the
    /// stream; everything yielded before it is still valid.
    fn discover<'a>(&'a self, cursor: Option<&'a Cursor>) -> ReleaseStream<'a>;

    /// Collect one call's worth of [`discover()`](Self::discover) into a
    /// [`Vec`].
    async fn discover_batch(&self, cursor: Option<&Cursor>) -> Result<Vec<Discovered>> {
        self.discover(cursor).try_collect().await
    }

    /// Download a release's artifact and list its contents.
    async fn fetch_manifest(&self, release: &ReleaseRef) -> Result<Manifest>;
}
