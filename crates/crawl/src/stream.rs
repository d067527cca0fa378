use crate::coordinator::Coordinator;
use crate::error::{ErrorKind, Result};
use crate::report::CycleReport;
use async_stream::stream;
use exn::ResultExt;
use filedex_index::WriteSummary;
use filedex_model::{Cursor, PackageKey};
use futures::stream::FuturesUnordered;
use futures::{Stream, StreamExt};
use std::pin::pin;
use std::time::Duration;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;

/// Releases discovered between watermark writes.
const WATERMARK_INTERVAL: u64 = 100;

/// Progress events emitted by [`Coordinator::crawl`].
///
/// Events follow a strict ordering:
/// 1. [`Started`](Self::Started), exactly once.
/// 2. [`Discovered`](Self::Discovered), once per release recorded.
/// 3. [`DiscoveryComplete`](Self::DiscoveryComplete), exactly once.
/// 4. [`BacklogLoaded`](Self::BacklogLoaded), exactly once unless the
///    backlog could not be read (which ends the stream with an error).
/// 5. Per package, any number of [`Retrying`](Self::Retrying) followed by
///    one of [`Ingested`](Self::Ingested), [`Failed`](Self::Failed) or
///    [`Interrupted`](Self::Interrupted). Packages interleave.
/// 6. [`Complete`](Self::Complete), exactly once.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CrawlEvent {
    Started,
    /// A release was recorded as `pending` (or was already known).
    Discovered(PackageKey),
    /// Discovery finished; `cursor` is the watermark now stored.
    DiscoveryComplete { discovered: u64, cursor: Option<Cursor> },
    /// Number of packages due for ingestion this cycle.
    BacklogLoaded(u64),
    Ingested { key: PackageKey, attempt: u32, summary: WriteSummary, skipped: usize },
    /// A transient failure; the package will be retried after `delay`.
    Retrying { key: PackageKey, attempt: u32, delay: Duration, error: String },
    Failed { key: PackageKey, error: String, permanent: bool },
    /// Cancelled mid-ingestion. The package stays in the backlog.
    Interrupted(PackageKey),
    Complete,
}

impl Coordinator {
    /// Run one crawl cycle, streaming its progress.
    ///
    /// A discovery failure is yielded as an `Err` item and the cycle carries
    /// on with ingestion. Only a failure to load the backlog ends the stream
    /// early (without [`CrawlEvent::Complete`]).
    ///
    /// Cancelling `cancel` stops discovery and starts no new ingestions;
    /// ingestions in flight are interrupted at their next fetch or back-off.
    pub fn crawl<'a>(&'a self, cancel: &'a CancellationToken) -> impl Stream<Item = Result<CrawlEvent>> + 'a {
        // `rustfmt` does not format macros that use braces. Wrap in parentheses!
        stream!({
            yield Ok(CrawlEvent::Started);

            let ecosystem = self.source.ecosystem();
            let mut discovered = 0u64;
            let mut failure = None;
            let start = match self.store.watermark(ecosystem).await {
                Ok(cursor) => cursor,
                Err(err) => {
                    failure = Some(err.raise(ErrorKind::Discovery));
                    None
                },
            };
            let mut watermark = start.clone();
            if failure.is_none() {
                let mut releases = self.source.discover(start.as_ref());
                let mut unsaved = 0u64;
                loop {
                    let next = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => None,
                        next = releases.next() => next,
                    };
                    let step = match next {
                        None => break,
                        Some(Ok(step)) => step,
                        Some(Err(err)) => {
                            failure = Some(err.raise(ErrorKind::Discovery));
                            break;
                        },
                    };
                    if let Some(release) = step.release {
                        if let Err(err) = self.store.upsert_package(&release).await {
                            failure = Some(err.raise(ErrorKind::Discovery));
                            break;
                        }
                        discovered += 1;
                        yield Ok(CrawlEvent::Discovered(release.key));
                    }
                    watermark = Some(step.cursor);
                    unsaved += 1;
                    if unsaved >= WATERMARK_INTERVAL
                        && let Some(cursor) = &watermark
                    {
                        if let Err(err) = self.store.set_watermark(ecosystem, cursor).await {
                            failure = Some(err.raise(ErrorKind::Discovery));
                            break;
                        }
                        unsaved = 0;
                    }
                }
            }
            if watermark != start
                && let Some(cursor) = &watermark
                && let Err(err) = self.store.set_watermark(ecosystem, cursor).await
            {
                tracing::warn!(error = %*err, "Could not save discovery watermark");
            }
            tracing::info!(discovered, watermark = ?watermark.as_ref().map(Cursor::as_str), "Discovery complete");
            yield Ok(CrawlEvent::DiscoveryComplete { discovered, cursor: watermark });
            if let Some(err) = failure {
                tracing::warn!(error = %*err, "Discovery stopped early");
                yield Err(err);
            }

            if cancel.is_cancelled() {
                yield Ok(CrawlEvent::Complete);
                return;
            }
            let backlog = match self
                .store
                .backlog(OffsetDateTime::now_utc(), self.settings.backlog_limit)
                .await
                .or_raise(|| ErrorKind::Backlog)
            {
                Ok(backlog) => backlog,
                Err(err) => {
                    yield Err(err);
                    return;
                },
            };
            // Infallible: a usize (either 32- or 64-bit) will always fit in a u64.
            yield Ok(CrawlEvent::BacklogLoaded(u64::try_from(backlog.len()).unwrap_or(0)));

            let mut backlog = backlog.into_iter();
            let mut processing = FuturesUnordered::new();
            processing.extend(backlog.by_ref().take(self.settings.concurrency.max(1)).map(|p| self.ingest(p, cancel)));
            while let Some(events) = processing.next().await {
                for event in events {
                    yield Ok(event);
                }
                if !cancel.is_cancelled()
                    && let Some(package) = backlog.next()
                {
                    processing.push(self.ingest(package, cancel));
                }
            }

            yield Ok(CrawlEvent::Complete);
        })
    }

    /// Run one crawl cycle to completion and summarize it.
    ///
    /// # Errors
    /// Only [`ErrorKind::Backlog`]; a discovery failure is recorded in the
    /// report instead.
    pub async fn run_crawl_cycle(&self, cancel: &CancellationToken) -> Result<CycleReport> {
        let mut report = CycleReport::default();
        let mut events = pin!(self.crawl(cancel));
        while let Some(event) = events.next().await {
            match event {
                Ok(event) => report.record(&event),
                Err(err) if !err.is_fatal() => report.discovery_error = Some((*err).to_string()),
                Err(err) => return Err(err),
            }
        }
        report.cancelled = cancel.is_cancelled();
        tracing::info!(
            discovered = report.discovered,
            ingested = report.ingested,
            failed = report.failed,
            failed_permanent = report.failed_permanent,
            interrupted = report.interrupted,
            "Crawl cycle finished"
        );
        Ok(report)
    }
}
