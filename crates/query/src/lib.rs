//! Lookups over the file index.
//!
//! A thin layer over [`IndexStore`](filedex_index::IndexStore) that parses
//! caller input, clamps result sizes and pages prefix listings. A lookup
//! that matches nothing is an empty result, never an error.

mod engine;
pub mod error;

pub use crate::engine::{Page, QueryEngine, QueryLimits};
