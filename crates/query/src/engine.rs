use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use filedex_index::{IndexStore, PrefixCursor};
use filedex_model::{ContentHash, FileEntry, FileMatch, PackageKey};
use filedex_normalize::{SkipReason, canonical_name, normalize_path};
use serde::{Deserialize, Serialize};
use tracing::instrument;

/// Result size bounds, protecting the index from unbounded scans.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryLimits {
    /// Page size when the caller doesn't ask for one.
    pub default_limit: usize,
    /// Requests above this are clamped, not rejected.
    pub max_limit: usize,
    /// Shortest prefix (in characters) a listing may start from.
    pub min_prefix_len: usize,
}

impl Default for QueryLimits {
    fn default() -> Self {
        Self { default_limit: 100, max_limit: 1000, min_prefix_len: 3 }
    }
}

/// One page of a prefix listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Page {
    pub items: Vec<FileMatch>,
    /// Pass back as `after` to continue; `None` on the last page.
    pub next: Option<PrefixCursor>,
}

/// The four lookups the index answers.
#[derive(Clone, Debug)]
pub struct QueryEngine {
    store: IndexStore,
    limits: QueryLimits,
}

impl QueryEngine {
    pub fn new(store: IndexStore, limits: QueryLimits) -> Self {
        Self { store, limits }
    }

    pub fn limits(&self) -> &QueryLimits {
        &self.limits
    }

    fn clamp(&self, limit: Option<usize>) -> usize {
        limit.unwrap_or(self.limits.default_limit).clamp(1, self.limits.max_limit.max(1))
    }

    /// Every package file with this content.
    ///
    /// Accepts `sha256:<hex>`, `sha1:<hex>`, the `=` forms or bare hex (the
    /// algorithm is inferred from its length), in any case.
    #[instrument(skip(self))]
    pub async fn by_hash(&self, hash: &str, limit: Option<usize>) -> Result<Vec<FileMatch>> {
        let hash: ContentHash = hash.parse::<ContentHash>().or_raise(|| ErrorKind::InvalidInput(format!("not a content hash: {hash}")))?;
        self.store.query_by_hash(&hash, self.clamp(limit)).await.or_raise(|| ErrorKind::Index)
    }

    /// Files whose path starts with `prefix`, ordered by path then package.
    ///
    /// The prefix is normalized like an archive path, except that a trailing
    /// `/` is kept: `demo/` lists the directory, `demo` also matches
    /// `demo_extra.py`.
    #[instrument(skip(self, after))]
    pub async fn by_prefix(&self, prefix: &str, after: Option<&PrefixCursor>, limit: Option<usize>) -> Result<Page> {
        let prefix = self.normalize_prefix(prefix)?;
        let limit = self.clamp(limit);
        // One extra row tells us whether another page exists.
        let mut items = self
            .store
            .query_by_prefix(&prefix, after, limit.saturating_add(1))
            .await
            .or_raise(|| ErrorKind::Index)?;
        let next = match items.len() > limit {
            true => {
                items.truncate(limit);
                items.last().map(PrefixCursor::from)
            },
            false => None,
        };
        Ok(Page { items, next })
    }

    fn normalize_prefix(&self, raw: &str) -> Result<String> {
        let mut prefix = match normalize_path(raw) {
            Ok(prefix) => prefix,
            Err(SkipReason::Empty) => String::new(),
            Err(reason) => exn::bail!(ErrorKind::InvalidInput(format!("invalid path prefix ({reason}): {raw}"))),
        };
        if !prefix.is_empty() && raw.ends_with(['/', '\\']) {
            prefix.push('/');
        }
        if prefix.chars().count() < self.limits.min_prefix_len {
            exn::bail!(ErrorKind::InvalidInput(format!(
                "path prefix must be at least {} characters",
                self.limits.min_prefix_len
            )));
        }
        Ok(prefix)
    }

    /// Every file of one release. The name may be given in any spelling
    /// that canonicalizes to the indexed one (`Demo_Pkg` finds `demo-pkg`).
    #[instrument(skip(self), fields(package = %key))]
    pub async fn package_files(&self, key: &PackageKey) -> Result<Vec<FileEntry>> {
        let key = PackageKey::new(key.ecosystem, canonical_name(key.ecosystem, &key.name), key.version.trim());
        self.store.list_package_files(&key).await.or_raise(|| ErrorKind::Index)
    }

    /// Packages that provide a top-level import `name`.
    #[instrument(skip(self))]
    pub async fn by_import_name(&self, name: &str, limit: Option<usize>) -> Result<Vec<PackageKey>> {
        let name = name.trim();
        if name.is_empty() {
            exn::bail!(ErrorKind::InvalidInput("import name is empty".to_string()));
        }
        self.store.query_by_import_name(name, self.clamp(limit)).await.or_raise(|| ErrorKind::Index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filedex_index::Database;
    use filedex_model::{Artifact, Ecosystem, FileType, HashAlgorithm, ReleaseRef};
    use rstest::rstest;

    fn hash(c: char) -> ContentHash {
        ContentHash::new(HashAlgorithm::Sha256, c.to_string().repeat(64)).unwrap()
    }

    fn file(path: &str, c: char) -> FileEntry {
        let sha1 = ContentHash::new(HashAlgorithm::Sha1, c.to_string().repeat(40)).unwrap();
        FileEntry { path: path.to_string(), hash: hash(c), sha1: Some(sha1), size: 1, file_type: FileType::Regular }
    }

    async fn ingest(store: &IndexStore, name: &str, version: &str, files: &[FileEntry]) -> PackageKey {
        let key = PackageKey::new(Ecosystem::Pypi, name, version);
        let filename = format!("{name}-{version}-py3-none-any.whl");
        let release = ReleaseRef {
            key: key.clone(),
            url: format!("https://files.example/{filename}"),
            artifact: Artifact { filename, sha256: None, size: None },
            released_at: None,
            yanked: false,
        };
        let id = store.upsert_package(&release).await.unwrap();
        store.write_files(id, files).await.unwrap();
        key
    }

    async fn engine(limits: QueryLimits) -> QueryEngine {
        let store = IndexStore::from(&Database::connect_in_memory().await.unwrap());
        ingest(&store, "demo", "1.0", &[file("demo/__init__.py", 'a'), file("demo/util.py", 'b')]).await;
        ingest(&store, "demo-extra", "2.0", &[file("demo_extra.py", 'a'), file("demo/util.py", 'c')]).await;
        QueryEngine::new(store, limits)
    }

    #[rstest]
    #[case::tagged(format!("sha256:{}", "a".repeat(64)))]
    #[case::bare("a".repeat(64))]
    #[case::uppercase("A".repeat(64))]
    #[case::equals(format!("SHA256={}", "a".repeat(64)))]
    #[tokio::test]
    async fn test_by_hash_forms(#[case] input: String) {
        let engine = engine(QueryLimits::default()).await;
        let matches = engine.by_hash(&input, None).await.unwrap();
        let paths: Vec<_> = matches.iter().map(|m| m.file.path.as_str()).collect();
        assert_eq!(paths, ["demo/__init__.py", "demo_extra.py"]);
    }

    #[rstest]
    #[case::tagged(format!("sha1:{}", "b".repeat(40)))]
    #[case::bare("B".repeat(40))]
    #[case::equals(format!("sha1={}", "b".repeat(40)))]
    #[tokio::test]
    async fn test_by_sha1(#[case] input: String) {
        let engine = engine(QueryLimits::default()).await;
        let matches = engine.by_hash(&input, None).await.unwrap();
        let found: Vec<_> = matches.iter().map(|m| (m.package.name.as_str(), m.file.path.as_str())).collect();
        assert_eq!(found, [("demo", "demo/util.py")]);
        assert_eq!(matches[0].file.hash, hash('b'));
    }

    #[tokio::test]
    async fn test_by_hash_not_found_is_empty() {
        let engine = engine(QueryLimits::default()).await;
        assert!(engine.by_hash(&"f".repeat(64), None).await.unwrap().is_empty());
    }

    #[rstest]
    #[case::garbage("not a hash")]
    #[case::short("abc123")]
    #[case::unknown_algorithm("md5:d41d8cd98f00b204e9800998ecf8427e")]
    #[tokio::test]
    async fn test_by_hash_invalid(#[case] input: &str) {
        let engine = engine(QueryLimits::default()).await;
        let err = engine.by_hash(input, None).await.unwrap_err();
        assert!(matches!(*err, ErrorKind::InvalidInput(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_by_hash_limit_is_clamped() {
        let engine = engine(QueryLimits { max_limit: 1, ..QueryLimits::default() }).await;
        assert_eq!(engine.by_hash(&"a".repeat(64), Some(50)).await.unwrap().len(), 1);
    }

    #[rstest]
    #[case::bare("demo", &["demo/__init__.py", "demo/util.py", "demo/util.py", "demo_extra.py"])]
    #[case::trailing_slash("demo/", &["demo/__init__.py", "demo/util.py", "demo/util.py"])]
    #[case::backslash(r"demo\util", &["demo/util.py", "demo/util.py"])]
    #[case::redundant("./demo//util.py", &["demo/util.py", "demo/util.py"])]
    #[case::nothing("zzz", &[])]
    #[tokio::test]
    async fn test_by_prefix(#[case] prefix: &str, #[case] expected: &[&str]) {
        let engine = engine(QueryLimits::default()).await;
        let page = engine.by_prefix(prefix, None, None).await.unwrap();
        let paths: Vec<_> = page.items.iter().map(|m| m.file.path.as_str()).collect();
        assert_eq!(paths, expected);
        assert_eq!(page.next, None);
    }

    #[tokio::test]
    async fn test_by_prefix_is_monotonic() {
        let engine = engine(QueryLimits::default()).await;
        let wide = engine.by_prefix("demo", None, None).await.unwrap().items;
        let narrow = engine.by_prefix("demo/u", None, None).await.unwrap().items;
        assert!(!narrow.is_empty());
        assert!(narrow.iter().all(|m| wide.contains(m)));
    }

    #[tokio::test]
    async fn test_by_prefix_pages() {
        let engine = engine(QueryLimits::default()).await;
        let mut seen = Vec::new();
        let mut after = None;
        loop {
            let page = engine.by_prefix("demo", after.as_ref(), Some(1)).await.unwrap();
            assert!(page.items.len() <= 1);
            seen.extend(page.items.into_iter().map(|m| (m.file.path, m.package.name)));
            match page.next {
                Some(next) => after = Some(next),
                None => break,
            }
        }
        assert_eq!(
            seen,
            [
                ("demo/__init__.py".to_string(), "demo".to_string()),
                ("demo/util.py".to_string(), "demo".to_string()),
                ("demo/util.py".to_string(), "demo-extra".to_string()),
                ("demo_extra.py".to_string(), "demo-extra".to_string()),
            ]
        );
    }

    #[rstest]
    #[case::too_short("de")]
    #[case::empty("")]
    #[case::only_separators("//")]
    #[case::traversal("../etc")]
    #[tokio::test]
    async fn test_by_prefix_invalid(#[case] prefix: &str) {
        let engine = engine(QueryLimits::default()).await;
        let err = engine.by_prefix(prefix, None, None).await.unwrap_err();
        assert!(matches!(*err, ErrorKind::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_package_files_canonicalizes_name() {
        let engine = engine(QueryLimits::default()).await;
        let files = engine.package_files(&PackageKey::new(Ecosystem::Pypi, "Demo_Extra", "2.0")).await.unwrap();
        assert_eq!(files.len(), 2);
        let missing = engine.package_files(&PackageKey::new(Ecosystem::Pypi, "demo", "9.9")).await.unwrap();
        assert!(missing.is_empty());
    }

    #[tokio::test]
    async fn test_by_import_name() {
        let engine = engine(QueryLimits::default()).await;
        let packages = engine.by_import_name("demo", None).await.unwrap();
        let names: Vec<_> = packages.iter().map(|k| k.name.as_str()).collect();
        assert_eq!(names, ["demo", "demo-extra"]);
        let extra = engine.by_import_name(" demo_extra ", None).await.unwrap();
        assert_eq!(extra, [PackageKey::new(Ecosystem::Pypi, "demo-extra", "2.0")]);
        assert!(engine.by_import_name("nothing", None).await.unwrap().is_empty());
        assert!(engine.by_import_name("  ", None).await.is_err());
    }
}
