//! Crawl coordinator.
//!
//! A crawl cycle runs in two phases:
//! 1. **Discovery** reads the stored watermark, asks the source adapter for
//!    everything after it, records each release as `pending` and advances
//!    the watermark as it goes.
//! 2. **Ingestion** loads the backlog (pending packages, retries that are
//!    due, abandoned claims) and ingests it with bounded concurrency: claim,
//!    fetch the manifest, normalize, write the file set.
//!
//! Discovery and ingestion are decoupled through the index, so a release is
//! never lost between the two: once discovered it stays in the backlog until
//! it is ingested or fails permanently.
//!
//! The primary entry point is [`Coordinator::crawl`], which streams
//! [`CrawlEvent`]s; [`Coordinator::run_crawl_cycle`] folds the same stream
//! into a [`CycleReport`].

mod coordinator;
pub mod error;
mod ingest;
mod report;
mod stream;

pub use crate::coordinator::{Coordinator, CrawlSettings};
pub use crate::report::CycleReport;
pub use crate::stream::CrawlEvent;
