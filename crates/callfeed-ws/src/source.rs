//! Subscription handles and the stream source seam.
//!
//! The feed never constructs a `StreamSubscriber` directly. It asks a
//! `StreamSource` for a `StreamSubscription`, so tests can substitute
//! `MockStreamSource` for a live server.

use crate::connection::{StreamConfig, StreamSubscriber};
use crate::error::StreamError;
use crate::event::StreamEvent;
use crate::state::ConnectionState;
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Scoped handle to one stream connection.
///
/// Yields the connection's events in order and ends after `Closed`.
/// Dropping the handle tears the connection down.
pub struct StreamSubscription {
    events: mpsc::Receiver<StreamEvent>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    state: Option<Arc<RwLock<ConnectionState>>>,
    finished: bool,
}

impl StreamSubscription {
    /// Open a live WebSocket connection in a background task.
    pub fn spawn(config: StreamConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.event_buffer.max(1));
        let cancel = CancellationToken::new();
        let subscriber = StreamSubscriber::new(config, tx, cancel.clone());
        let state = subscriber.state_handle();
        let task = tokio::spawn(async move {
            let final_state = subscriber.run().await;
            debug!(state = final_state.label(), "Stream subscriber finished");
        });

        Self {
            events: rx,
            cancel,
            task: Some(task),
            state: Some(state),
            finished: false,
        }
    }

    /// Subscription fed by an arbitrary channel.
    pub fn from_channel(events: mpsc::Receiver<StreamEvent>, cancel: CancellationToken) -> Self {
        Self {
            events,
            cancel,
            task: None,
            state: None,
            finished: false,
        }
    }

    /// Next event, or `None` once the sequence has ended.
    ///
    /// A channel that closes without a `Closed` event still terminates the
    /// sequence with `Closed`: a teardown close if this handle was cancelled,
    /// otherwise a transport error.
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        if self.finished {
            return None;
        }
        let event = match self.events.recv().await {
            Some(event) => event,
            None if self.cancel.is_cancelled() => StreamEvent::Closed(None),
            None => {
                warn!("Stream subscriber ended without close");
                StreamEvent::Closed(Some(StreamError::Transport(
                    "subscriber ended without close".to_string(),
                )))
            }
        };
        if event.is_terminal() {
            self.finished = true;
        }
        Some(event)
    }

    /// Connection state, when backed by a live subscriber.
    pub fn state(&self) -> Option<ConnectionState> {
        self.state.as_ref().map(|s| s.read().clone())
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Tear down and wait for the background task to exit.
    pub async fn close(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for StreamSubscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Produces stream subscriptions.
pub trait StreamSource: Send + Sync {
    /// Open a new connection instance.
    fn subscribe(&self) -> StreamSubscription;
}

pub type DynStreamSource = Arc<dyn StreamSource>;

/// Live WebSocket source.
#[derive(Debug, Clone)]
pub struct WsStreamSource {
    config: StreamConfig,
}

impl WsStreamSource {
    pub fn new(config: StreamConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }
}

impl StreamSource for WsStreamSource {
    fn subscribe(&self) -> StreamSubscription {
        StreamSubscription::spawn(self.config.clone())
    }
}

/// Test-side end of a scripted subscription.
#[derive(Clone)]
pub struct ScriptedStream {
    events: mpsc::Sender<StreamEvent>,
    cancel: CancellationToken,
}

impl ScriptedStream {
    /// Push an event to the subscription. Returns false once it is gone.
    pub async fn push(&self, event: StreamEvent) -> bool {
        self.events.send(event).await.is_ok()
    }

    /// Whether the owner tore this subscription down.
    pub fn is_torn_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait until the owner tears this subscription down.
    pub async fn torn_down(&self) {
        self.cancel.cancelled().await;
    }
}

/// Mock stream source for testing.
///
/// Each `subscribe` takes the next scripted stream in order. Once the
/// script runs out, subscriptions stay pending until torn down.
#[derive(Default)]
pub struct MockStreamSource {
    scripted: Mutex<VecDeque<(mpsc::Receiver<StreamEvent>, CancellationToken)>>,
    idle: Mutex<Vec<ScriptedStream>>,
    subscribes: AtomicUsize,
}

impl MockStreamSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a subscription and return the handle that drives it.
    pub fn script(&self) -> ScriptedStream {
        let (tx, rx) = mpsc::channel(64);
        let cancel = CancellationToken::new();
        self.scripted.lock().push_back((rx, cancel.clone()));
        ScriptedStream { events: tx, cancel }
    }

    /// Number of subscriptions opened so far.
    pub fn subscribe_count(&self) -> usize {
        self.subscribes.load(Ordering::SeqCst)
    }
}

impl StreamSource for MockStreamSource {
    fn subscribe(&self) -> StreamSubscription {
        self.subscribes.fetch_add(1, Ordering::SeqCst);
        if let Some((rx, cancel)) = self.scripted.lock().pop_front() {
            return StreamSubscription::from_channel(rx, cancel);
        }

        let (tx, rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        self.idle.lock().push(ScriptedStream {
            events: tx,
            cancel: cancel.clone(),
        });
        StreamSubscription::from_channel(rx, cancel)
    }
}
