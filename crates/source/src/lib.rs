//! Package ecosystem adapters.
//!
//! A [`SourceAdapter`] knows how to do exactly two things for one ecosystem:
//! list releases it hasn't reported yet ([`discover`](SourceAdapter::discover))
//! and enumerate the files of one release
//! ([`fetch_manifest`](SourceAdapter::fetch_manifest)). It never persists
//! anything; the crawl coordinator owns state.
//!
//! Adapters:
//! - [`PypiSource`]: the Python Package Index (JSON simple API + JSON API).
//! - `MockSource` (feature `mock`): scripted in-memory releases for tests.

mod adapter;
pub mod error;
#[cfg(feature = "mock")]
mod mock;
mod pypi;

pub use crate::adapter::{Discovered, ReleaseStream, SourceAdapter};
#[cfg(feature = "mock")]
pub use crate::mock::{MockSource, release};
pub use crate::pypi::{PypiSettings, PypiSource};
pub use filedex_archive::Limits;
use std::sync::Arc;

pub type SourceHandle = Arc<dyn SourceAdapter + Send + Sync>;
