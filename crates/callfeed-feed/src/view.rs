//! Render boundary.

use crate::error::FeedError;
use callfeed_core::Message;
use std::fmt;
use std::sync::Arc;

/// Feed status shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedStatus {
    /// Initial snapshot not yet resolved.
    Loading,
    /// A fetch or stream failure is outstanding. Messages are still shown.
    Error,
    Ready,
}

impl FeedStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Loading => "loading",
            Self::Error => "error",
            Self::Ready => "ready",
        }
    }
}

impl fmt::Display for FeedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable snapshot of the exposed feed.
///
/// Cloning is cheap: the message sequence is shared.
#[derive(Debug, Clone)]
pub struct FeedView {
    /// Newest first, each id at most once.
    pub messages: Arc<[Arc<Message>]>,
    pub status: FeedStatus,
    pub last_error: Option<FeedError>,
    /// Bumped on every change of the exposed state.
    pub revision: u64,
}

impl FeedView {
    pub fn loading() -> Self {
        Self {
            messages: Arc::from(Vec::new()),
            status: FeedStatus::Loading,
            last_error: None,
            revision: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Ids in display order.
    pub fn ids(&self) -> Vec<&str> {
        self.messages.iter().map(|m| m.id.as_str()).collect()
    }
}
