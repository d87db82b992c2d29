//! Feed state machine.
//!
//! Single writer, no I/O. The driver feeds it `FeedEvent`s in arrival
//! order and publishes `view()` whenever `apply` reports a change.
//!
//! Merge rules:
//! - Stream messages that arrive before the first snapshot settles are
//!   buffered and not exposed.
//! - Snapshot success exposes `dedupe(buffered ++ snapshot)`, newest first.
//! - Snapshot failure exposes the buffer on its own; later stream messages
//!   are admitted directly.
//! - After that, stream messages are inserted at their ordered position and
//!   duplicates are dropped.
//!
//! Every snapshot attempt and stream subscription carries a tag; events for an
//! older tag than the current one are ignored.

use crate::error::FeedError;
use crate::view::{FeedStatus, FeedView};
use callfeed_core::{Message, MessageId};
use callfeed_snapshot::FetchError;
use callfeed_telemetry::Metrics;
use callfeed_ws::StreamError;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Input to the feed state machine.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    /// A snapshot request with this tag was issued.
    SnapshotStarted { attempt: u64 },
    SnapshotResolved { attempt: u64, messages: Vec<Message> },
    SnapshotFailed { attempt: u64, error: FetchError },
    /// Subscription with this tag reached Open.
    StreamOpened { subscription: u64 },
    StreamMessage { subscription: u64, message: Message },
    /// `error` is `None` for an explicit teardown.
    StreamClosed {
        subscription: u64,
        error: Option<StreamError>,
    },
    /// The feed's owner went away. Terminal.
    Deactivated,
}

/// Where an exposed entry came from. Snapshot entries sort first on ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Origin {
    Snapshot,
    Stream,
}

impl Origin {
    fn label(self) -> &'static str {
        match self {
            Self::Snapshot => "snapshot",
            Self::Stream => "stream",
        }
    }
}

#[derive(Debug)]
struct Entry {
    message: Arc<Message>,
    origin: Origin,
    /// Arrival order.
    seq: u64,
}

fn display_order(a: &Entry, b: &Entry) -> Ordering {
    b.message
        .created_at
        .cmp(&a.message.created_at)
        .then(a.origin.cmp(&b.origin))
        .then(a.seq.cmp(&b.seq))
}

/// Merged feed state.
#[derive(Debug)]
pub struct FeedState {
    active: bool,

    snapshot_attempt: u64,
    snapshot_pending: bool,
    /// The first snapshot attempt has resolved or failed.
    snapshot_settled: bool,

    subscription: u64,

    /// Stream messages held back until the first snapshot settles.
    buffer: Vec<(Arc<Message>, u64)>,
    /// Exposed entries in display order.
    entries: Vec<Entry>,
    /// Ids of exposed and buffered messages.
    ids: HashSet<MessageId>,
    exposed: Arc<[Arc<Message>]>,

    fetch_error: Option<FetchError>,
    stream_error: Option<StreamError>,

    next_seq: u64,
    revision: u64,
}

impl Default for FeedState {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedState {
    /// A freshly activated feed: empty and loading.
    pub fn new() -> Self {
        Self {
            active: true,
            snapshot_attempt: 0,
            snapshot_pending: false,
            snapshot_settled: false,
            subscription: 0,
            buffer: Vec::new(),
            entries: Vec::new(),
            ids: HashSet::new(),
            exposed: Arc::from(Vec::new()),
            fetch_error: None,
            stream_error: None,
            next_seq: 0,
            revision: 0,
        }
    }

    /// Apply one event. Returns true if the exposed view changed.
    pub fn apply(&mut self, event: FeedEvent) -> bool {
        if !self.active {
            trace!(?event, "Feed inactive, ignoring event");
            return false;
        }

        let before = (self.status(), self.last_error());

        let sequence_changed = match event {
            FeedEvent::SnapshotStarted { attempt } => self.on_snapshot_started(attempt),
            FeedEvent::SnapshotResolved { attempt, messages } => {
                self.on_snapshot_resolved(attempt, messages)
            }
            FeedEvent::SnapshotFailed { attempt, error } => {
                self.on_snapshot_failed(attempt, error)
            }
            FeedEvent::StreamOpened { subscription } => self.on_stream_opened(subscription),
            FeedEvent::StreamMessage {
                subscription,
                message,
            } => self.on_stream_message(subscription, message),
            FeedEvent::StreamClosed {
                subscription,
                error,
            } => self.on_stream_closed(subscription, error),
            FeedEvent::Deactivated => {
                debug!("Feed deactivated");
                self.active = false;
                self.buffer.clear();
                false
            }
        };

        if sequence_changed {
            self.exposed = self.entries.iter().map(|e| e.message.clone()).collect();
        }

        let changed = sequence_changed || before != (self.status(), self.last_error());
        if changed {
            self.revision += 1;
        }
        changed
    }

    /// Status precedence: fetch error > stream error > loading > ready.
    pub fn status(&self) -> FeedStatus {
        if self.fetch_error.is_some() || self.stream_error.is_some() {
            FeedStatus::Error
        } else if !self.snapshot_settled {
            FeedStatus::Loading
        } else {
            FeedStatus::Ready
        }
    }

    pub fn last_error(&self) -> Option<FeedError> {
        self.fetch_error
            .clone()
            .map(FeedError::Fetch)
            .or_else(|| self.stream_error.clone().map(FeedError::Stream))
    }

    pub fn view(&self) -> FeedView {
        FeedView {
            messages: self.exposed.clone(),
            status: self.status(),
            last_error: self.last_error(),
            revision: self.revision,
        }
    }

    pub fn messages(&self) -> &[Arc<Message>] {
        &self.exposed
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_snapshot_pending(&self) -> bool {
        self.snapshot_pending
    }

    /// Stream messages held back awaiting the first snapshot.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn on_snapshot_started(&mut self, attempt: u64) -> bool {
        if attempt <= self.snapshot_attempt {
            trace!(attempt, current = self.snapshot_attempt, "Stale snapshot start");
            return false;
        }
        self.snapshot_attempt = attempt;
        self.snapshot_pending = true;
        false
    }

    fn is_current_snapshot(&self, attempt: u64) -> bool {
        let current = self.snapshot_pending && attempt == self.snapshot_attempt;
        if !current {
            trace!(attempt, current = self.snapshot_attempt, "Ignoring stale snapshot result");
        }
        current
    }

    fn on_snapshot_resolved(&mut self, attempt: u64, messages: Vec<Message>) -> bool {
        if !self.is_current_snapshot(attempt) {
            return false;
        }
        self.snapshot_pending = false;
        self.snapshot_settled = true;
        self.fetch_error = None;

        let flushed = self.flush_buffer();

        let total = messages.len();
        let mut admitted = 0;
        for message in messages {
            if self.ids.insert(message.id.clone()) {
                let seq = self.next_seq();
                self.entries.push(Entry {
                    message: Arc::new(message),
                    origin: Origin::Snapshot,
                    seq,
                });
                admitted += 1;
            }
        }
        self.entries.sort_by(display_order);

        let duplicates = total - admitted;
        Metrics::messages_admitted(Origin::Snapshot.label(), admitted);
        Metrics::messages_duplicate(duplicates);
        debug!(
            attempt,
            admitted,
            duplicates,
            flushed,
            size = self.entries.len(),
            "Snapshot merged"
        );

        admitted > 0 || flushed > 0
    }

    fn on_snapshot_failed(&mut self, attempt: u64, error: FetchError) -> bool {
        if !self.is_current_snapshot(attempt) {
            return false;
        }
        self.snapshot_pending = false;
        self.snapshot_settled = true;
        warn!(attempt, error = %error, "Snapshot failed");
        self.fetch_error = Some(error);

        let flushed = self.flush_buffer();
        if flushed > 0 {
            self.entries.sort_by(display_order);
        }
        flushed > 0
    }

    /// Move buffered stream messages into the exposed entries (unsorted).
    fn flush_buffer(&mut self) -> usize {
        let flushed = self.buffer.len();
        for (message, seq) in self.buffer.drain(..) {
            self.entries.push(Entry {
                message,
                origin: Origin::Stream,
                seq,
            });
        }
        if flushed > 0 {
            Metrics::messages_admitted(Origin::Stream.label(), flushed);
        }
        flushed
    }

    /// Older subscription tags are stale; a newer tag becomes current.
    fn adopt_subscription(&mut self, subscription: u64) -> bool {
        if subscription < self.subscription {
            return false;
        }
        self.subscription = subscription;
        true
    }

    fn on_stream_opened(&mut self, subscription: u64) -> bool {
        if !self.adopt_subscription(subscription) {
            trace!(subscription, current = self.subscription, "Stale stream open");
            return false;
        }
        if let Some(e) = self.stream_error.take() {
            debug!(subscription, previous = %e, "Stream recovered");
        }
        false
    }

    fn on_stream_message(&mut self, subscription: u64, message: Message) -> bool {
        if !self.adopt_subscription(subscription) {
            trace!(subscription, current = self.subscription, "Ignoring stale stream message");
            return false;
        }
        if self.ids.contains(&message.id) {
            trace!(id = %message.id, "Duplicate stream message dropped");
            Metrics::messages_duplicate(1);
            return false;
        }
        self.ids.insert(message.id.clone());

        let seq = self.next_seq();
        let message = Arc::new(message);

        if !self.snapshot_settled {
            trace!(id = %message.id, "Buffering stream message until snapshot settles");
            self.buffer.push((message, seq));
            return false;
        }

        let pos = self
            .entries
            .partition_point(|e| e.message.created_at >= message.created_at);
        self.entries.insert(
            pos,
            Entry {
                message,
                origin: Origin::Stream,
                seq,
            },
        );
        Metrics::messages_admitted(Origin::Stream.label(), 1);
        true
    }

    fn on_stream_closed(&mut self, subscription: u64, error: Option<StreamError>) -> bool {
        if !self.adopt_subscription(subscription) {
            trace!(subscription, current = self.subscription, "Ignoring stale stream close");
            return false;
        }
        if let Some(e) = error {
            warn!(subscription, error = %e, "Stream lost");
            self.stream_error = Some(e);
        }
        false
    }

    fn next_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use callfeed_core::Channel;
    use chrono::{TimeZone, Utc};

    fn msg(id: i64, ts: i64) -> Message {
        Message::new(
            id,
            Channel::with_id(1i64, "Alpha Calls"),
            format!("call {id}"),
            Utc.timestamp_opt(ts, 0).unwrap(),
        )
    }

    fn ids(state: &FeedState) -> Vec<String> {
        state
            .messages()
            .iter()
            .map(|m| m.id.as_str().to_string())
            .collect()
    }

    /// Snapshot attempt 1 pending, subscription 1 open.
    fn activated() -> FeedState {
        let mut state = FeedState::new();
        state.apply(FeedEvent::SnapshotStarted { attempt: 1 });
        state.apply(FeedEvent::StreamOpened { subscription: 1 });
        state
    }

    fn stream(state: &mut FeedState, m: Message) -> bool {
        state.apply(FeedEvent::StreamMessage {
            subscription: 1,
            message: m,
        })
    }

    fn assert_newest_first_unique(state: &FeedState) {
        let messages = state.messages();
        for pair in messages.windows(2) {
            assert!(pair[0].created_at >= pair[1].created_at);
        }
        let unique: HashSet<_> = messages.iter().map(|m| m.id.clone()).collect();
        assert_eq!(unique.len(), messages.len());
    }

    #[test]
    fn test_initial_status_is_loading() {
        let state = activated();
        assert_eq!(state.status(), FeedStatus::Loading);
        assert!(state.messages().is_empty());
        assert!(state.last_error().is_none());
    }

    #[test]
    fn test_stream_message_prepended_after_snapshot() {
        let mut state = activated();
        assert!(state.apply(FeedEvent::SnapshotResolved {
            attempt: 1,
            messages: vec![msg(1, 10), msg(2, 5)],
        }));
        assert_eq!(state.status(), FeedStatus::Ready);

        assert!(stream(&mut state, msg(3, 20)));
        assert_eq!(ids(&state), ["3", "1", "2"]);
    }

    #[test]
    fn test_buffered_messages_merged_with_snapshot() {
        let mut state = activated();
        assert!(!stream(&mut state, msg(5, 1)));
        assert!(!stream(&mut state, msg(6, 2)));
        assert!(state.messages().is_empty());
        assert_eq!(state.buffered_len(), 2);

        state.apply(FeedEvent::SnapshotResolved {
            attempt: 1,
            messages: vec![msg(5, 1)],
        });
        assert_eq!(state.status(), FeedStatus::Ready);
        assert_eq!(ids(&state), ["6", "5"]);
        assert_eq!(state.buffered_len(), 0);
    }

    #[test]
    fn test_buffered_copy_wins_over_snapshot_copy() {
        let mut state = activated();
        let mut live = msg(5, 1);
        live.body = "from stream".to_string();
        stream(&mut state, live);

        state.apply(FeedEvent::SnapshotResolved {
            attempt: 1,
            messages: vec![msg(5, 1)],
        });
        assert_eq!(state.messages()[0].body, "from stream");
    }

    #[test]
    fn test_snapshot_failure_is_error_with_empty_feed() {
        let mut state = activated();
        assert!(state.apply(FeedEvent::SnapshotFailed {
            attempt: 1,
            error: FetchError::Network("connection refused".to_string()),
        }));

        let view = state.view();
        assert_eq!(view.status, FeedStatus::Error);
        assert!(view.messages.is_empty());
        assert!(matches!(
            view.last_error,
            Some(FeedError::Fetch(FetchError::Network(_)))
        ));
    }

    #[test]
    fn test_snapshot_failure_exposes_buffer_and_admits_live() {
        let mut state = activated();
        stream(&mut state, msg(5, 1));
        state.apply(FeedEvent::SnapshotFailed {
            attempt: 1,
            error: FetchError::Timeout,
        });
        assert_eq!(ids(&state), ["5"]);

        assert!(stream(&mut state, msg(6, 2)));
        assert_eq!(ids(&state), ["6", "5"]);
        assert_eq!(state.status(), FeedStatus::Error);
    }

    #[test]
    fn test_retry_after_failure_merges_and_clears_error() {
        let mut state = activated();
        state.apply(FeedEvent::SnapshotFailed {
            attempt: 1,
            error: FetchError::Timeout,
        });
        stream(&mut state, msg(9, 30));

        state.apply(FeedEvent::SnapshotStarted { attempt: 2 });
        assert_eq!(state.status(), FeedStatus::Error);

        state.apply(FeedEvent::SnapshotResolved {
            attempt: 2,
            messages: vec![msg(9, 30), msg(1, 10)],
        });
        assert_eq!(state.status(), FeedStatus::Ready);
        assert!(state.last_error().is_none());
        assert_eq!(ids(&state), ["9", "1"]);
    }

    #[test]
    fn test_stream_drop_keeps_messages() {
        let mut state = activated();
        state.apply(FeedEvent::SnapshotResolved {
            attempt: 1,
            messages: vec![msg(1, 10), msg(2, 5)],
        });

        assert!(state.apply(FeedEvent::StreamClosed {
            subscription: 1,
            error: Some(StreamError::HeartbeatTimeout),
        }));
        assert_eq!(state.status(), FeedStatus::Error);
        assert_eq!(ids(&state), ["1", "2"]);
        assert!(matches!(
            state.last_error(),
            Some(FeedError::Stream(StreamError::HeartbeatTimeout))
        ));
    }

    #[test]
    fn test_reopen_returns_to_ready() {
        let mut state = activated();
        state.apply(FeedEvent::SnapshotResolved {
            attempt: 1,
            messages: vec![msg(1, 10)],
        });
        state.apply(FeedEvent::StreamClosed {
            subscription: 1,
            error: Some(StreamError::HeartbeatTimeout),
        });

        assert!(state.apply(FeedEvent::StreamOpened { subscription: 2 }));
        assert_eq!(state.status(), FeedStatus::Ready);

        assert!(state.apply(FeedEvent::StreamMessage {
            subscription: 2,
            message: msg(2, 20),
        }));
        assert_eq!(ids(&state), ["2", "1"]);
    }

    #[test]
    fn test_reopen_while_snapshot_pending_is_loading() {
        let mut state = activated();
        state.apply(FeedEvent::StreamClosed {
            subscription: 1,
            error: Some(StreamError::ConnectTimeout),
        });
        assert_eq!(state.status(), FeedStatus::Error);

        state.apply(FeedEvent::StreamOpened { subscription: 2 });
        assert_eq!(state.status(), FeedStatus::Loading);
    }

    #[test]
    fn test_fetch_error_takes_precedence() {
        let mut state = activated();
        state.apply(FeedEvent::StreamClosed {
            subscription: 1,
            error: Some(StreamError::HeartbeatTimeout),
        });
        state.apply(FeedEvent::SnapshotFailed {
            attempt: 1,
            error: FetchError::Timeout,
        });
        assert!(matches!(
            state.last_error(),
            Some(FeedError::Fetch(FetchError::Timeout))
        ));
    }

    #[test]
    fn test_teardown_close_sets_no_error() {
        let mut state = activated();
        state.apply(FeedEvent::SnapshotResolved {
            attempt: 1,
            messages: vec![msg(1, 10)],
        });
        assert!(!state.apply(FeedEvent::StreamClosed {
            subscription: 1,
            error: None,
        }));
        assert_eq!(state.status(), FeedStatus::Ready);
    }

    #[test]
    fn test_duplicates_dropped_silently() {
        let mut state = activated();
        state.apply(FeedEvent::SnapshotResolved {
            attempt: 1,
            messages: vec![msg(1, 10), msg(1, 10), msg(2, 5)],
        });
        let revision = state.revision();

        assert!(!stream(&mut state, msg(2, 5)));
        assert!(!stream(&mut state, msg(1, 99)));
        assert_eq!(ids(&state), ["1", "2"]);
        assert_eq!(state.revision(), revision);
    }

    #[test]
    fn test_late_stream_message_inserted_in_order() {
        let mut state = activated();
        state.apply(FeedEvent::SnapshotResolved {
            attempt: 1,
            messages: vec![msg(1, 30), msg(2, 10)],
        });
        stream(&mut state, msg(3, 20));
        stream(&mut state, msg(4, 1));
        assert_eq!(ids(&state), ["1", "3", "2", "4"]);
    }

    #[test]
    fn test_ties_keep_snapshot_before_stream_then_arrival() {
        let mut state = activated();
        stream(&mut state, msg(7, 10));
        state.apply(FeedEvent::SnapshotResolved {
            attempt: 1,
            messages: vec![msg(1, 10), msg(2, 10)],
        });
        stream(&mut state, msg(8, 10));
        assert_eq!(ids(&state), ["1", "2", "7", "8"]);
    }

    #[test]
    fn test_ordering_and_uniqueness_hold_under_interleaving() {
        let mut state = activated();
        for i in 0..20i64 {
            stream(&mut state, msg(i % 7, (i * 37) % 11));
        }
        let snapshot: Vec<Message> = (0..15i64).map(|i| msg(i, (i * 13) % 17)).collect();
        state.apply(FeedEvent::SnapshotResolved {
            attempt: 1,
            messages: snapshot,
        });
        for i in 10..40i64 {
            stream(&mut state, msg(i, (i * 29) % 23));
        }

        assert_newest_first_unique(&state);
        assert_eq!(state.messages().len(), 40);
    }

    #[test]
    fn test_stale_snapshot_result_ignored() {
        let mut state = activated();
        state.apply(FeedEvent::SnapshotStarted { attempt: 2 });
        assert!(!state.apply(FeedEvent::SnapshotResolved {
            attempt: 1,
            messages: vec![msg(1, 10)],
        }));
        assert!(state.messages().is_empty());
        assert!(state.is_snapshot_pending());
        assert!(!state.apply(FeedEvent::SnapshotStarted { attempt: 1 }));
    }

    #[test]
    fn test_stale_subscription_events_ignored() {
        let mut state = activated();
        state.apply(FeedEvent::SnapshotResolved {
            attempt: 1,
            messages: vec![],
        });
        state.apply(FeedEvent::StreamOpened { subscription: 2 });

        assert!(!stream(&mut state, msg(1, 10)));
        assert!(!state.apply(FeedEvent::StreamClosed {
            subscription: 1,
            error: Some(StreamError::HeartbeatTimeout),
        }));
        assert!(!state.apply(FeedEvent::StreamOpened { subscription: 1 }));
        assert_eq!(state.status(), FeedStatus::Ready);
        assert!(state.messages().is_empty());
    }

    #[test]
    fn test_connect_failure_before_open_surfaces() {
        let mut state = FeedState::new();
        state.apply(FeedEvent::SnapshotStarted { attempt: 1 });
        assert!(state.apply(FeedEvent::StreamClosed {
            subscription: 1,
            error: Some(StreamError::ConnectTimeout),
        }));
        assert_eq!(state.status(), FeedStatus::Error);

        // A reconnect that also fails before opening replaces the error.
        assert!(state.apply(FeedEvent::StreamClosed {
            subscription: 2,
            error: Some(StreamError::ConnectFailed("refused".to_string())),
        }));
        assert!(matches!(
            state.last_error(),
            Some(FeedError::Stream(StreamError::ConnectFailed(_)))
        ));
        assert!(!state.apply(FeedEvent::StreamOpened { subscription: 1 }));
    }

    #[test]
    fn test_deactivated_ignores_everything() {
        let mut state = activated();
        stream(&mut state, msg(1, 10));
        assert!(!state.apply(FeedEvent::Deactivated));
        assert!(!state.is_active());
        assert_eq!(state.buffered_len(), 0);

        assert!(!state.apply(FeedEvent::SnapshotResolved {
            attempt: 1,
            messages: vec![msg(2, 10)],
        }));
        assert!(state.messages().is_empty());
        assert_eq!(state.status(), FeedStatus::Loading);
    }

    #[test]
    fn test_view_is_complete_and_revisioned() {
        let mut state = activated();
        let before = state.view();
        state.apply(FeedEvent::SnapshotResolved {
            attempt: 1,
            messages: vec![msg(1, 10)],
        });
        let after = state.view();

        assert_eq!(before.revision + 1, after.revision);
        assert!(before.messages.is_empty());
        assert_eq!(after.ids(), ["1"]);
        assert_eq!(after.status, FeedStatus::Ready);
    }
}
