//! Feed error types.

use callfeed_snapshot::FetchError;
use callfeed_ws::StreamError;
use thiserror::Error;

/// Failure surfaced at the feed boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeedError {
    #[error("Snapshot failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Stream failed: {0}")]
    Stream(#[from] StreamError),
}
