//! Snapshot source trait.
//!
//! The feed state machine only needs "give me the latest N messages". This
//! seam lets the feed run against the real HTTP client or a scripted source
//! in tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use callfeed_core::{BoxFuture, Message};
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::client::SnapshotClient;
use crate::error::{FetchError, FetchResult};

/// Source of point-in-time feed snapshots.
pub trait SnapshotSource: Send + Sync {
    /// Fetch up to `limit` most recent messages, newest-first.
    fn fetch(&self, limit: usize) -> BoxFuture<'_, FetchResult<Vec<Message>>>;
}

impl SnapshotSource for SnapshotClient {
    fn fetch(&self, limit: usize) -> BoxFuture<'_, FetchResult<Vec<Message>>> {
        Box::pin(self.fetch_recent(limit))
    }
}

/// Arc wrapper for SnapshotSource trait objects.
pub type DynSnapshotSource = Arc<dyn SnapshotSource>;

enum ScriptedResponse {
    Ready(FetchResult<Vec<Message>>),
    Deferred(oneshot::Receiver<FetchResult<Vec<Message>>>),
}

/// Scripted snapshot source for tests.
///
/// Each `fetch` consumes the next scripted response in order. Deferred
/// responses stay pending until the test completes them through the
/// returned sender.
#[derive(Default)]
pub struct MockSnapshotSource {
    responses: Mutex<VecDeque<ScriptedResponse>>,
    calls: AtomicUsize,
    last_limit: AtomicUsize,
}

impl MockSnapshotSource {
    /// Create a mock with no scripted responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response returned immediately.
    pub fn respond_with(&self, result: FetchResult<Vec<Message>>) {
        self.responses
            .lock()
            .push_back(ScriptedResponse::Ready(result));
    }

    /// Queue a response that resolves when the returned sender fires.
    pub fn defer(&self) -> oneshot::Sender<FetchResult<Vec<Message>>> {
        let (tx, rx) = oneshot::channel();
        self.responses
            .lock()
            .push_back(ScriptedResponse::Deferred(rx));
        tx
    }

    /// Number of fetches issued so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Limit passed to the most recent fetch.
    pub fn last_limit(&self) -> usize {
        self.last_limit.load(Ordering::SeqCst)
    }
}

impl SnapshotSource for MockSnapshotSource {
    fn fetch(&self, limit: usize) -> BoxFuture<'_, FetchResult<Vec<Message>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.last_limit.store(limit, Ordering::SeqCst);
        let next = self.responses.lock().pop_front();
        Box::pin(async move {
            match next {
                Some(ScriptedResponse::Ready(result)) => result,
                Some(ScriptedResponse::Deferred(rx)) => rx.await.unwrap_or_else(|_| {
                    Err(FetchError::Network("deferred response dropped".to_string()))
                }),
                None => Err(FetchError::Network("no scripted response".to_string())),
            }
        })
    }
}
