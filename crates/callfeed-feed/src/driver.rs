//! Feed actor.
//!
//! One task per active feed owns the `FeedState`, the in-flight snapshot
//! future and the current stream subscription. It is the only writer; readers
//! observe complete `FeedView`s through a `watch` channel.

use crate::state::{FeedEvent, FeedState};
use crate::view::FeedView;
use callfeed_core::{BoxFuture, Message};
use callfeed_snapshot::{
    outcome_label, DynSnapshotSource, FetchError, FetchResult, DEFAULT_LIMIT,
};
use callfeed_telemetry::Metrics;
use callfeed_ws::{DynStreamSource, ReconnectPolicy, StreamEvent, StreamSubscription};
use std::future::{pending, Future};
use std::pin::Pin;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Feed driver configuration.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Snapshot size.
    pub limit: usize,
    /// Upper bound on one snapshot request.
    pub snapshot_timeout_ms: u64,
    pub reconnect: ReconnectPolicy,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            snapshot_timeout_ms: 10_000,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

#[derive(Debug)]
enum FeedCommand {
    RetrySnapshot,
}

type SnapshotOutcome = (u64, FetchResult<Vec<Message>>, Duration);

/// Handle to a running feed.
///
/// Dropping the handle deactivates the feed and releases its connection.
pub struct FeedHandle {
    commands: mpsc::Sender<FeedCommand>,
    views: watch::Receiver<FeedView>,
    cancel: CancellationToken,
}

impl FeedHandle {
    /// Latest published view.
    pub fn view(&self) -> FeedView {
        self.views.borrow().clone()
    }

    /// Receiver notified on every published view.
    pub fn subscribe(&self) -> watch::Receiver<FeedView> {
        self.views.clone()
    }

    /// Ask for a new snapshot attempt. No-op while one is in flight.
    ///
    /// Returns false if the feed has already stopped.
    pub async fn retry_snapshot(&self) -> bool {
        self.commands.send(FeedCommand::RetrySnapshot).await.is_ok()
    }

    /// Wait until a published view satisfies `predicate`.
    ///
    /// Returns `None` if the feed stops first.
    pub async fn wait_for(&self, mut predicate: impl FnMut(&FeedView) -> bool) -> Option<FeedView> {
        let mut rx = self.views.clone();
        let view = rx.wait_for(|v| predicate(v)).await.ok()?;
        Some(view.clone())
    }

    /// Deactivate the feed and wait until its connection is released.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        let mut rx = self.views.clone();
        // The actor drops the sender only after closing the subscription.
        while rx.changed().await.is_ok() {}
    }
}

impl Drop for FeedHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Feed actor task.
struct FeedTask {
    config: FeedConfig,
    snapshots: DynSnapshotSource,
    streams: DynStreamSource,
    state: FeedState,
    views: watch::Sender<FeedView>,
    commands: mpsc::Receiver<FeedCommand>,
    cancel: CancellationToken,

    snapshot_attempt: u64,
    subscription_tag: u64,
    /// Consecutive reconnects since the last Open.
    reconnect_attempt: u32,
}

impl FeedTask {
    async fn run(mut self) {
        info!(limit = self.config.limit, "Feed activated");

        let mut snapshot = Some(self.start_snapshot());
        let mut subscription = Some(self.open_stream());
        let mut reconnect: Option<Pin<Box<Sleep>>> = None;

        loop {
            tokio::select! {
                biased;

                () = self.cancel.cancelled() => break,

                command = self.commands.recv() => match command {
                    Some(FeedCommand::RetrySnapshot) => {
                        if snapshot.is_none() {
                            info!("Retrying snapshot");
                            snapshot = Some(self.start_snapshot());
                        } else {
                            debug!("Snapshot already in flight, retry ignored");
                        }
                    }
                    None => break,
                },

                (attempt, result, elapsed) = next_or_pending(&mut snapshot) => {
                    snapshot = None;
                    self.on_snapshot(attempt, result, elapsed);
                }

                event = next_stream_event(&mut subscription) => {
                    let subscription_tag = self.subscription_tag;
                    match event {
                        Some(StreamEvent::Opened) => {
                            self.reconnect_attempt = 0;
                            self.publish(FeedEvent::StreamOpened { subscription: subscription_tag });
                        }
                        Some(StreamEvent::Message(message)) => {
                            self.publish(FeedEvent::StreamMessage {
                                subscription: subscription_tag,
                                message,
                            });
                        }
                        Some(StreamEvent::Closed(error)) => {
                            subscription = None;
                            let lost = error.clone();
                            self.publish(FeedEvent::StreamClosed {
                                subscription: subscription_tag,
                                error,
                            });
                            if let Some(e) = lost {
                                reconnect = self.schedule_reconnect(e.reason_label());
                            }
                        }
                        None => subscription = None,
                    }
                }

                () = next_or_pending(&mut reconnect) => {
                    reconnect = None;
                    subscription = Some(self.open_stream());
                }
            }
        }

        self.publish(FeedEvent::Deactivated);
        drop(snapshot);
        if let Some(sub) = subscription.take() {
            sub.close().await;
        }
        info!("Feed deactivated");
    }

    fn start_snapshot(&mut self) -> BoxFuture<'static, SnapshotOutcome> {
        self.snapshot_attempt += 1;
        let attempt = self.snapshot_attempt;
        self.publish(FeedEvent::SnapshotStarted { attempt });

        let source = self.snapshots.clone();
        let limit = self.config.limit;
        let timeout = Duration::from_millis(self.config.snapshot_timeout_ms);
        debug!(attempt, limit, "Fetching snapshot");

        Box::pin(async move {
            let started = Instant::now();
            let result = match tokio::time::timeout(timeout, source.fetch(limit)).await {
                Ok(result) => result,
                Err(_) => Err(FetchError::Timeout),
            };
            (attempt, result, started.elapsed())
        })
    }

    fn on_snapshot(&mut self, attempt: u64, result: FetchResult<Vec<Message>>, elapsed: Duration) {
        let latency_ms = elapsed.as_secs_f64() * 1000.0;
        Metrics::snapshot_fetched(outcome_label(&result), latency_ms);
        match result {
            Ok(messages) => {
                info!(attempt, count = messages.len(), latency_ms, "Snapshot received");
                self.publish(FeedEvent::SnapshotResolved { attempt, messages });
            }
            Err(error) => {
                self.publish(FeedEvent::SnapshotFailed { attempt, error });
            }
        }
    }

    fn open_stream(&mut self) -> StreamSubscription {
        self.subscription_tag += 1;
        debug!(subscription = self.subscription_tag, "Opening stream subscription");
        self.streams.subscribe()
    }

    fn schedule_reconnect(&mut self, reason: &str) -> Option<Pin<Box<Sleep>>> {
        let attempt = self.reconnect_attempt + 1;
        if !self.config.reconnect.allows(attempt) {
            warn!(attempt, "Reconnect not allowed by policy, stream stays down");
            return None;
        }
        self.reconnect_attempt = attempt;
        let delay = self.config.reconnect.delay(attempt);
        let delay_ms = delay.as_millis() as u64;
        Metrics::stream_reconnect(reason);
        info!(attempt, delay_ms, reason, "Scheduling stream reconnect");
        Some(Box::pin(tokio::time::sleep(delay)))
    }

    fn publish(&mut self, event: FeedEvent) {
        if self.state.apply(event) {
            let view = self.state.view();
            Metrics::feed_size(view.messages.len());
            debug!(
                revision = view.revision,
                status = %view.status,
                size = view.messages.len(),
                "Feed view updated"
            );
            self.views.send_replace(view);
        }
    }
}

/// Await the future if present, otherwise never resolve.
async fn next_or_pending<F>(slot: &mut Option<F>) -> F::Output
where
    F: Future + Unpin,
{
    match slot {
        Some(fut) => fut.await,
        None => pending().await,
    }
}

async fn next_stream_event(slot: &mut Option<StreamSubscription>) -> Option<StreamEvent> {
    match slot {
        Some(sub) => sub.next_event().await,
        None => pending().await,
    }
}

/// Activate a feed: start the snapshot fetch and the stream subscription
/// concurrently and merge them.
///
/// Returns a handle for observing the feed and the actor's join handle.
#[must_use]
pub fn spawn_feed(
    config: FeedConfig,
    snapshots: DynSnapshotSource,
    streams: DynStreamSource,
) -> (FeedHandle, JoinHandle<()>) {
    let (command_tx, command_rx) = mpsc::channel(8);
    let state = FeedState::new();
    let (view_tx, view_rx) = watch::channel(state.view());
    let cancel = CancellationToken::new();

    let task = FeedTask {
        config,
        snapshots,
        streams,
        state,
        views: view_tx,
        commands: command_rx,
        cancel: cancel.clone(),
        snapshot_attempt: 0,
        subscription_tag: 0,
        reconnect_attempt: 0,
    };

    let handle = FeedHandle {
        commands: command_tx,
        views: view_rx,
        cancel,
    };

    let join_handle = tokio::spawn(task.run());

    (handle, join_handle)
}
