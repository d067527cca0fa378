//! Ingestion of a single package.

use crate::coordinator::Coordinator;
use crate::stream::CrawlEvent;
use filedex_model::{Package, PackageStatus};
use filedex_normalize::normalize_manifest;
use retry_policies::{RetryDecision, RetryPolicy};
use std::time::{Duration, SystemTime};
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// What happened to the current attempt, before deciding what to do next.
enum Step {
    Done,
    Retry,
}

impl Coordinator {
    /// Claim, fetch, normalize and write one package, retrying transient
    /// fetch failures in place.
    ///
    /// Never fails: every outcome is recorded in the index and reported as
    /// events (retries first, then exactly one of `Ingested`, `Failed` or
    /// `Interrupted`, or nothing if the package was no longer claimable).
    #[instrument(skip_all, fields(package = %package.key))]
    pub(crate) async fn ingest(&self, package: Package, cancel: &CancellationToken) -> Vec<CrawlEvent> {
        self.with_package_lock(package.id, async {
            let mut events = Vec::new();
            let started = SystemTime::now();
            while let Step::Retry = self.attempt(&package, cancel, started, &mut events).await {}
            events
        })
        .await
    }

    async fn attempt(
        &self,
        package: &Package,
        cancel: &CancellationToken,
        started: SystemTime,
        events: &mut Vec<CrawlEvent>,
    ) -> Step {
        let key = &package.key;
        let attempt = match self.store.claim(package.id).await {
            Ok(Some(attempt)) => attempt,
            Ok(None) => {
                tracing::debug!("Package is no longer claimable; skipping");
                return Step::Done;
            },
            Err(err) => {
                tracing::warn!(error = %*err, "Could not claim package");
                events.push(CrawlEvent::Failed { key: key.clone(), error: (*err).to_string(), permanent: false });
                return Step::Done;
            },
        };

        let release = package.release();
        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = self.source.fetch_manifest(&release) => Some(result),
        };
        let error = match fetched {
            None => {
                if let Err(err) = self.store.release_claim(package.id).await {
                    tracing::warn!(error = %*err, "Could not release interrupted claim");
                }
                tracing::info!(attempt, "Ingestion interrupted");
                events.push(CrawlEvent::Interrupted(key.clone()));
                return Step::Done;
            },
            Some(Ok(manifest)) => {
                let normalized = normalize_manifest(&manifest);
                for skip in normalized.notable_skips() {
                    tracing::warn!(path = %skip.raw_path.escape_debug(), reason = %skip.reason, "Skipped file");
                }
                let skipped = normalized.notable_skips().count();
                match self.store.write_files(package.id, &normalized.entries).await {
                    Ok(summary) => {
                        tracing::info!(attempt, files = summary.files, skipped, "Ingested package");
                        events.push(CrawlEvent::Ingested { key: key.clone(), attempt, summary, skipped });
                    },
                    // Nothing was written; try again next cycle rather than
                    // hammering a struggling database.
                    Err(err) => {
                        tracing::warn!(attempt, error = %*err, "Could not store package files");
                        let error = (*err).to_string();
                        if let Err(err) = self.store.schedule_retry(package.id, &error, OffsetDateTime::now_utc()).await {
                            tracing::warn!(error = %*err, "Could not schedule retry");
                        }
                        events.push(CrawlEvent::Failed { key: key.clone(), error, permanent: false });
                    },
                }
                return Step::Done;
            },
            Some(Err(err)) => err,
        };

        let message = (*error).to_string();
        let decision = match error.is_retryable() {
            true => self.backoff.should_retry(started, attempt.saturating_sub(1)),
            false => RetryDecision::DoNotRetry,
        };
        let RetryDecision::Retry { execute_after } = decision else {
            tracing::warn!(attempt, error = %message, "Package failed permanently");
            let status = PackageStatus::Failed { permanent: true };
            if let Err(err) = self.store.mark_status(package.id, status, Some(&message)).await {
                tracing::warn!(error = %*err, "Could not record permanent failure");
            }
            events.push(CrawlEvent::Failed { key: key.clone(), error: message, permanent: true });
            return Step::Done;
        };

        // Persist before sleeping so a crash mid-backoff still leaves the
        // package due for retry.
        if let Err(err) = self.store.schedule_retry(package.id, &message, OffsetDateTime::from(execute_after)).await {
            tracing::warn!(error = %*err, "Could not schedule retry");
            events.push(CrawlEvent::Failed { key: key.clone(), error: message, permanent: false });
            return Step::Done;
        }
        let delay = execute_after.duration_since(SystemTime::now()).unwrap_or(Duration::ZERO);
        tracing::info!(attempt, error = %message, delay_ms = delay.as_millis() as u64, "Retrying package");
        events.push(CrawlEvent::Retrying { key: key.clone(), attempt, delay, error: message });
        tokio::select! {
            biased;
            // The scheduled retry stays in place for the next cycle.
            _ = cancel.cancelled() => {
                events.push(CrawlEvent::Interrupted(key.clone()));
                Step::Done
            },
            _ = tokio::time::sleep(delay) => Step::Retry,
        }
    }
}
