use dashmap::DashMap;
use filedex_index::IndexStore;
use filedex_model::PackageId;
use filedex_source::SourceHandle;
use retry_policies::policies::ExponentialBackoff;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Tuning for a crawl cycle.
#[derive(Clone, Debug)]
pub struct CrawlSettings {
    /// Packages ingested at the same time.
    pub concurrency: usize,
    /// Attempts (across cycles) before a transient failure becomes permanent.
    pub max_attempts: u32,
    pub backoff_min: Duration,
    pub backoff_max: Duration,
    /// Packages taken from the backlog per cycle.
    pub backlog_limit: usize,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            concurrency: 5,
            max_attempts: 5,
            backoff_min: Duration::from_secs(1),
            backoff_max: Duration::from_secs(60),
            backlog_limit: 10_000,
        }
    }
}

/// Drives a source adapter into the index.
///
/// Cheap to share: every method takes `&self`, and the only mutable state
/// is the per-package lock table.
pub struct Coordinator {
    pub(crate) source: SourceHandle,
    pub(crate) store: IndexStore,
    pub(crate) settings: CrawlSettings,
    pub(crate) backoff: ExponentialBackoff,
    locks: DashMap<PackageId, Arc<Mutex<()>>>,
}

impl Coordinator {
    pub fn new(source: SourceHandle, store: IndexStore, settings: CrawlSettings) -> Self {
        let backoff = ExponentialBackoff::builder()
            .retry_bounds(settings.backoff_min, settings.backoff_max.max(settings.backoff_min))
            .build_with_max_retries(settings.max_attempts.saturating_sub(1));
        Self { source, store, settings, backoff, locks: DashMap::new() }
    }

    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    /// Run `f` while holding the lock for `id`: at most one ingestion of a
    /// package is in flight, however it was scheduled.
    pub(crate) async fn with_package_lock<F, T>(&self, id: PackageId, f: F) -> T
    where
        F: Future<Output = T>,
    {
        let lock = self.locks.entry(id).or_default().clone();
        let result = {
            let _guard = lock.lock().await;
            f.await
        };
        drop(lock);
        // Only the table still holds it: nobody else is waiting.
        self.locks.remove_if(&id, |_, lock| Arc::strong_count(lock) == 1);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filedex_index::Database;
    use filedex_source::MockSource;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_package_lock_serializes_and_cleans_up() {
        let store = IndexStore::from(&Database::connect_in_memory().await.unwrap());
        let coordinator = Coordinator::new(Arc::new(MockSource::default()), store, CrawlSettings::default());
        let running = &AtomicUsize::new(0);
        let work = move || async move {
            assert_eq!(running.fetch_add(1, Ordering::SeqCst), 0, "two holders of the same package lock");
            tokio::time::sleep(Duration::from_millis(5)).await;
            running.fetch_sub(1, Ordering::SeqCst);
        };
        tokio::join!(
            coordinator.with_package_lock(PackageId(1), work()),
            coordinator.with_package_lock(PackageId(1), work()),
        );
        assert!(coordinator.locks.is_empty());
    }
}
