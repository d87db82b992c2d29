//! Stream subscriber: one WebSocket connection instance.
//!
//! A subscriber connects once, forwards every pushed message as a
//! `StreamEvent`, and ends with exactly one `Closed` event. It never
//! reconnects on its own; the owner builds a new subscriber instead.

use crate::error::StreamError;
use crate::event::StreamEvent;
use crate::frame::{classify, InboundFrame};
use crate::heartbeat::HeartbeatMonitor;
use crate::state::{ConnectionState, Transition};
use callfeed_telemetry::Metrics;
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::{
    connect_async_tls_with_config, tungstenite::Message as WsFrame, MaybeTlsStream,
    WebSocketStream,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Path of the push endpoint relative to the API origin.
const STREAM_PATH: &str = "/api/feed/stream";

/// Derive the stream URL from the API origin (`http` → `ws`, `https` → `wss`).
pub fn stream_url_for_origin(origin: &str) -> String {
    let base = origin.trim_end_matches('/');
    let ws_base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base.to_string()
    };
    format!("{ws_base}{STREAM_PATH}")
}

/// Stream connection configuration.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// WebSocket URL.
    pub url: String,
    /// Handshake timeout.
    pub connect_timeout_ms: u64,
    /// Silence before a ping is sent (0 = heartbeat disabled).
    pub heartbeat_interval_ms: u64,
    /// Ping must be answered within this.
    pub heartbeat_timeout_ms: u64,
    /// Capacity of the event channel.
    pub event_buffer: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            connect_timeout_ms: 10_000,
            heartbeat_interval_ms: 45_000,
            heartbeat_timeout_ms: 10_000,
            event_buffer: 256,
        }
    }
}

impl StreamConfig {
    /// Config targeting the stream endpoint of `origin`.
    pub fn for_origin(origin: &str) -> Self {
        Self {
            url: stream_url_for_origin(origin),
            ..Self::default()
        }
    }
}

/// One stream connection instance.
pub struct StreamSubscriber {
    config: StreamConfig,
    state: Arc<RwLock<ConnectionState>>,
    events: mpsc::Sender<StreamEvent>,
    cancel: CancellationToken,
}

impl StreamSubscriber {
    /// Create a subscriber that reports through `events` and stops on `cancel`.
    pub fn new(
        config: StreamConfig,
        events: mpsc::Sender<StreamEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            state: Arc::new(RwLock::new(ConnectionState::Connecting)),
            events,
            cancel,
        }
    }

    /// Shared view of the connection state.
    pub fn state_handle(&self) -> Arc<RwLock<ConnectionState>> {
        self.state.clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.state.read().clone()
    }

    /// Connect, pump events until the connection ends, emit `Closed`.
    ///
    /// Consumes the subscriber; a closed connection cannot be restarted.
    pub async fn run(self) -> ConnectionState {
        let terminal = match self.connect().await {
            Ok(mut ws) => {
                self.apply(Transition::Established);
                Metrics::stream_connected();
                info!(url = %self.config.url, "Stream connected");
                if self.emit(StreamEvent::Opened).await {
                    self.pump(ws).await
                } else {
                    debug!("Teardown requested before open was delivered, closing stream");
                    if let Err(e) = ws.send(WsFrame::Close(None)).await {
                        warn!(?e, "Failed to send Close frame during teardown");
                    }
                    Transition::Teardown
                }
            }
            Err(transition) => transition,
        };

        let closed_with = match &terminal {
            Transition::ConnectFailed(e) | Transition::Dropped(e) => Some(e.clone()),
            _ => None,
        };

        let was_open = self.state.read().is_open();
        self.apply(terminal);
        if was_open {
            Metrics::stream_disconnected();
        }

        match &closed_with {
            Some(e) => warn!(error = %e, "Stream closed"),
            None => info!("Stream closed by teardown"),
        }

        let event = StreamEvent::Closed(closed_with);
        if self.cancel.is_cancelled() {
            // Owner is tearing down and may no longer be draining.
            let _ = self.events.try_send(event);
        } else {
            self.emit(event).await;
        }

        self.state()
    }

    async fn connect(&self) -> Result<WsStream, Transition> {
        let url = &self.config.url;
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(Transition::ConnectFailed(StreamError::InvalidUrl(
                url.clone(),
            )));
        }

        info!(url = %url, "Connecting to stream");
        let timeout = Duration::from_millis(self.config.connect_timeout_ms);

        tokio::select! {
            biased;

            () = self.cancel.cancelled() => Err(Transition::Teardown),

            result = tokio::time::timeout(
                timeout,
                // TCP_NODELAY: frames are small and latency matters more than batching.
                connect_async_tls_with_config(url.as_str(), None, true, None),
            ) => match result {
                Ok(Ok((ws, _response))) => Ok(ws),
                Ok(Err(e)) => {
                    error!(error = %e, "Stream handshake failed");
                    Err(Transition::ConnectFailed(StreamError::ConnectFailed(
                        e.to_string(),
                    )))
                }
                Err(_) => Err(Transition::ConnectFailed(StreamError::ConnectTimeout)),
            },
        }
    }

    /// Read loop for an open connection. Returns the closing transition.
    async fn pump(&self, ws: WsStream) -> Transition {
        let (mut write, mut read) = ws.split();

        let mut heartbeat = HeartbeatMonitor::new(
            Duration::from_millis(self.config.heartbeat_interval_ms),
            Duration::from_millis(self.config.heartbeat_timeout_ms),
        );
        heartbeat.reset(Instant::now());
        let mut ticker = tokio::time::interval(heartbeat.check_period());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                () = self.cancel.cancelled() => {
                    debug!("Teardown requested, closing stream");
                    if let Err(e) = write.send(WsFrame::Close(None)).await {
                        warn!(?e, "Failed to send Close frame during teardown");
                    }
                    return Transition::Teardown;
                }

                frame = read.next() => {
                    let now = Instant::now();
                    match frame {
                        Some(Ok(WsFrame::Text(text))) => {
                            heartbeat.record_inbound(now);
                            if !self.handle_text(&text).await {
                                return Transition::Teardown;
                            }
                        }
                        Some(Ok(WsFrame::Binary(data))) => {
                            heartbeat.record_inbound(now);
                            match String::from_utf8(data) {
                                Ok(text) => {
                                    if !self.handle_text(&text).await {
                                        return Transition::Teardown;
                                    }
                                }
                                Err(e) => {
                                    Metrics::message_malformed("stream");
                                    warn!(error = %e, "Skipping non UTF-8 binary frame");
                                }
                            }
                        }
                        Some(Ok(WsFrame::Ping(data))) => {
                            heartbeat.record_inbound(now);
                            if let Err(e) = write.send(WsFrame::Pong(data)).await {
                                return Transition::Dropped(e.into());
                            }
                        }
                        Some(Ok(WsFrame::Pong(_))) => {
                            heartbeat.record_inbound(now);
                        }
                        Some(Ok(WsFrame::Close(frame))) => {
                            let (code, reason) = frame
                                .map(|f| (f.code.into(), f.reason.to_string()))
                                .unwrap_or((1005, "No status".to_string()));
                            warn!(code, %reason, "Stream closed by server");
                            return Transition::Dropped(StreamError::Dropped { code, reason });
                        }
                        Some(Ok(WsFrame::Frame(_))) => {}
                        Some(Err(e)) => {
                            error!(?e, "Stream read error");
                            return Transition::Dropped(e.into());
                        }
                        None => {
                            warn!("Stream ended");
                            return Transition::Dropped(StreamError::Dropped {
                                code: 1006,
                                reason: "Stream ended".to_string(),
                            });
                        }
                    }
                }

                _ = ticker.tick(), if heartbeat.is_enabled() => {
                    let now = Instant::now();
                    if heartbeat.is_timed_out(now) {
                        error!("Heartbeat timeout");
                        return Transition::Dropped(StreamError::HeartbeatTimeout);
                    }
                    if heartbeat.should_ping(now) {
                        if let Err(e) = write.send(WsFrame::Ping(Vec::new())).await {
                            return Transition::Dropped(e.into());
                        }
                        heartbeat.record_ping(now);
                        debug!("Sent heartbeat ping");
                    }
                }
            }
        }
    }

    /// Returns false when the owner has gone away.
    async fn handle_text(&self, text: &str) -> bool {
        match classify(text) {
            Ok(InboundFrame::Keepalive) => {
                debug!("Received keepalive");
                true
            }
            Ok(InboundFrame::Message(message)) => {
                debug!(id = %message.id, channel = %message.channel.name, "Received message");
                self.emit(StreamEvent::Message(message)).await
            }
            Err(e) => {
                Metrics::message_malformed("stream");
                warn!(error = %e, "Skipping malformed stream frame");
                true
            }
        }
    }

    /// Deliver an event unless teardown wins first. Returns false if undelivered.
    async fn emit(&self, event: StreamEvent) -> bool {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => false,
            sent = self.events.send(event) => sent.is_ok(),
        }
    }

    fn apply(&self, transition: Transition) {
        let mut state = self.state.write();
        match state.next(transition) {
            Ok(next) => {
                debug!(from = state.label(), to = next.label(), "Stream state transition");
                *state = next;
            }
            Err(e) => warn!(error = %e, "Ignoring invalid stream transition"),
        }
    }
}
