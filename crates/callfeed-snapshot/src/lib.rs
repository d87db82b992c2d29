//! Snapshot fetcher for the calls feed.
//!
//! One request/response exchange against `GET {origin}/api/feed?limit=N`
//! returning the most recent messages newest-first.

pub mod client;
pub mod error;
pub mod source;

pub use client::{SnapshotClient, DEFAULT_LIMIT, DEFAULT_TIMEOUT};
pub use error::{outcome_label, FetchError, FetchResult};
pub use source::{DynSnapshotSource, MockSnapshotSource, SnapshotSource};
