use crate::stream::CrawlEvent;
use filedex_model::Cursor;
use serde::Serialize;

/// Summary of one crawl cycle.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// Releases recorded during discovery.
    pub discovered: u64,
    pub watermark: Option<Cursor>,
    /// Why discovery stopped early, if it did.
    pub discovery_error: Option<String>,
    /// Packages that were due for ingestion.
    pub backlog: u64,
    pub ingested: u64,
    /// Files written across all ingested packages.
    pub files: u64,
    /// Manifest entries skipped during normalization (directories excluded).
    pub skipped_files: u64,
    pub retries: u64,
    /// Transient failures left for a later cycle.
    pub failed: u64,
    pub failed_permanent: u64,
    pub interrupted: u64,
    pub cancelled: bool,
}

impl CycleReport {
    pub(crate) fn record(&mut self, event: &CrawlEvent) {
        match event {
            CrawlEvent::Started | CrawlEvent::Discovered(_) | CrawlEvent::Complete => {},
            CrawlEvent::DiscoveryComplete { discovered, cursor } => {
                self.discovered = *discovered;
                self.watermark = cursor.clone();
            },
            CrawlEvent::BacklogLoaded(n) => self.backlog = *n,
            CrawlEvent::Ingested { summary, skipped, .. } => {
                self.ingested += 1;
                self.files += summary.files as u64;
                self.skipped_files += *skipped as u64;
            },
            CrawlEvent::Retrying { .. } => self.retries += 1,
            CrawlEvent::Failed { permanent: true, .. } => self.failed_permanent += 1,
            CrawlEvent::Failed { permanent: false, .. } => self.failed += 1,
            CrawlEvent::Interrupted(_) => self.interrupted += 1,
        }
    }
}
