//! In-memory source adapter for testing.

use crate::adapter::{Discovered, ReleaseStream, SourceAdapter};
use crate::error::{ErrorKind, Result};
use async_stream::stream;
use async_trait::async_trait;
use filedex_model::{Artifact, Cursor, Ecosystem, Manifest, PackageKey, ReleaseRef};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::RwLock;

/// Build a [`ReleaseRef`] for a PyPI wheel with sensible placeholder fields.
pub fn release(name: &str, version: &str) -> ReleaseRef {
    let filename = format!("{}-{version}-py3-none-any.whl", name.replace('-', "_"));
    ReleaseRef {
        key: PackageKey::new(Ecosystem::Pypi, name, version),
        url: format!("https://files.example/{filename}"),
        artifact: Artifact { filename, sha256: None, size: None },
        released_at: None,
        yanked: false,
    }
}

/// Scripted in-memory source.
///
/// Releases are discovered in insertion order; the cursor is the number of
/// releases already reported (`mock:<n>`). Failures can be scripted per
/// package and are consumed one per [`fetch_manifest()`](SourceAdapter::fetch_manifest)
/// call, after which the real manifest is returned.
///
/// # Examples
///
/// ```
/// use filedex_model::{Manifest, ManifestEntry};
/// use filedex_source::{MockSource, SourceAdapter, error::ErrorKind, release};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let demo = release("demo", "1.0");
/// let source = MockSource::with_releases([
///     (demo.clone(), Manifest::new(vec![ManifestEntry::regular("demo/__init__.py", 0)])),
/// ]);
/// source.fail_next(&demo.key, [ErrorKind::Network]).await;
///
/// assert!(source.fetch_manifest(&demo).await.is_err());
/// assert_eq!(source.fetch_manifest(&demo).await.unwrap().entries.len(), 1);
/// assert_eq!(source.fetch_count(&demo.key).await, 2);
/// # }
/// ```
#[derive(Default)]
pub struct MockSource {
    releases: RwLock<Vec<ReleaseRef>>,
    manifests: RwLock<HashMap<PackageKey, Manifest>>,
    failures: RwLock<HashMap<PackageKey, VecDeque<ErrorKind>>>,
    fetches: RwLock<HashMap<PackageKey, u32>>,
    discovery_failure: RwLock<Option<usize>>,
    fetch_delay: RwLock<Option<Duration>>,
}

impl MockSource {
    pub fn with_releases(releases: impl IntoIterator<Item = (ReleaseRef, Manifest)>) -> Self {
        let mut ordered = Vec::new();
        let mut manifests = HashMap::new();
        for (release, manifest) in releases {
            manifests.insert(release.key.clone(), manifest);
            ordered.push(release);
        }
        Self {
            releases: RwLock::new(ordered),
            manifests: RwLock::new(manifests),
            ..Self::default()
        }
    }

    /// Publish another release; it is reported after everything already known.
    pub async fn add_release(&self, release: ReleaseRef, manifest: Manifest) {
        self.manifests.write().await.insert(release.key.clone(), manifest);
        self.releases.write().await.push(release);
    }

    /// Make the next fetches of `key` fail with these errors, in order.
    pub async fn fail_next(&self, key: &PackageKey, kinds: impl IntoIterator<Item = ErrorKind>) {
        self.failures.write().await.entry(key.clone()).or_default().extend(kinds);
    }

    /// How many times [`fetch_manifest()`](SourceAdapter::fetch_manifest) was
    /// called for `key`, successful or not.
    pub async fn fetch_count(&self, key: &PackageKey) -> u32 {
        self.fetches.read().await.get(key).copied().unwrap_or_default()
    }

    /// Fail (once, with a network error) when discovery reaches the release
    /// at `index`. Everything before it is still reported.
    pub async fn fail_discovery_at(&self, index: usize) {
        *self.discovery_failure.write().await = Some(index);
    }

    /// Delay every fetch, to give cancellation something to interrupt.
    pub async fn set_fetch_delay(&self, delay: Duration) {
        *self.fetch_delay.write().await = Some(delay);
    }

    fn position(cursor: Option<&Cursor>) -> usize {
        cursor
            .and_then(|c| c.as_str().strip_prefix("mock:"))
            .and_then(|n| n.parse().ok())
            .unwrap_or_default()
    }
}

#[async_trait]
impl SourceAdapter for MockSource {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Pypi
    }

    fn discover<'a>(&'a self, cursor: Option<&'a Cursor>) -> ReleaseStream<'a> {
        let start = Self::position(cursor);
        Box::pin(stream!({
            // Snapshot, so the lock isn't held across yield points.
            let releases: Vec<ReleaseRef> = self.releases.read().await.iter().skip(start).cloned().collect();
            for (offset, release) in releases.into_iter().enumerate() {
                let index = start + offset;
                let fail = {
                    let mut failure = self.discovery_failure.write().await;
                    failure.take_if(|at| *at == index).is_some()
                };
                if fail {
                    yield Err(exn::Exn::from(ErrorKind::Network));
                    return;
                }
                yield Ok(Discovered { release: Some(release), cursor: Cursor(format!("mock:{}", index + 1)) });
            }
        }))
    }

    async fn fetch_manifest(&self, release: &ReleaseRef) -> Result<Manifest> {
        *self.fetches.write().await.entry(release.key.clone()).or_default() += 1;
        let delay = *self.fetch_delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let failure = self.failures.write().await.get_mut(&release.key).and_then(VecDeque::pop_front);
        if let Some(kind) = failure {
            exn::bail!(kind);
        }
        self.manifests.read().await.get(&release.key).cloned().ok_or_else(|| exn::Exn::from(ErrorKind::NotFound))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filedex_model::ManifestEntry;
    use futures::TryStreamExt;

    fn manifest() -> Manifest {
        Manifest::new(vec![ManifestEntry::regular("demo/__init__.py", 0)])
    }

    #[tokio::test]
    async fn test_discover_resumes_from_cursor() {
        let source = MockSource::with_releases([
            (release("a", "1"), manifest()),
            (release("b", "1"), manifest()),
            (release("c", "1"), manifest()),
        ]);
        let all = source.discover_batch(None).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[2].cursor.as_str(), "mock:3");

        let rest = source.discover_batch(Some(&all[0].cursor)).await.unwrap();
        let names: Vec<_> = rest.iter().map(|d| d.release.as_ref().unwrap().key.name.as_str()).collect();
        assert_eq!(names, ["b", "c"]);

        assert!(source.discover_batch(Some(&all[2].cursor)).await.unwrap().is_empty());
        source.add_release(release("d", "1"), manifest()).await;
        assert_eq!(source.discover_batch(Some(&all[2].cursor)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_discovery_failure_is_one_shot() {
        let source = MockSource::with_releases([(release("a", "1"), manifest()), (release("b", "1"), manifest())]);
        source.fail_discovery_at(1).await;

        let mut stream = source.discover(None);
        assert!(stream.try_next().await.unwrap().is_some());
        let err = stream.try_next().await.unwrap_err();
        assert_eq!(*err, ErrorKind::Network);
        drop(stream);

        assert_eq!(source.discover_batch(None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_scripted_fetch_failures() {
        let demo = release("demo", "1.0");
        let source = MockSource::with_releases([(demo.clone(), manifest())]);
        source.fail_next(&demo.key, [ErrorKind::Network, ErrorKind::TooLarge]).await;

        assert_eq!(*source.fetch_manifest(&demo).await.unwrap_err(), ErrorKind::Network);
        assert_eq!(*source.fetch_manifest(&demo).await.unwrap_err(), ErrorKind::TooLarge);
        assert_eq!(source.fetch_manifest(&demo).await.unwrap(), manifest());
        assert_eq!(source.fetch_count(&demo.key).await, 3);
    }

    #[tokio::test]
    async fn test_unknown_release_not_found() {
        let source = MockSource::default();
        let err = source.fetch_manifest(&release("ghost", "0.1")).await.unwrap_err();
        assert_eq!(*err, ErrorKind::NotFound);
    }
}
