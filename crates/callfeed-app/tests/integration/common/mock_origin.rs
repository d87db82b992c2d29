//! Mock API origin for integration tests.
//!
//! Serves `GET /api/feed` from a fixed snapshot (or a scripted failure) and pushes frames to
//! every connected `/api/feed/stream` client through a broadcast channel.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU16, AtomicU32, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

/// Frame pushed to stream clients.
#[derive(Debug, Clone)]
pub enum PushFrame {
    Text(String),
    /// Close every open stream connection.
    Close,
}

#[derive(Clone)]
struct OriginState {
    snapshot: Arc<Vec<Value>>,
    snapshot_status: Arc<AtomicU16>,
    snapshot_requests: Arc<AtomicU32>,
    stream_connections: Arc<AtomicU32>,
    push: broadcast::Sender<PushFrame>,
}

/// In-process origin serving both feed endpoints.
pub struct MockOrigin {
    origin: String,
    state: OriginState,
}

impl MockOrigin {
    pub async fn start(snapshot: Vec<Value>) -> Self {
        let (push, _) = broadcast::channel(64);
        let state = OriginState {
            snapshot: Arc::new(snapshot),
            snapshot_status: Arc::new(AtomicU16::new(200)),
            snapshot_requests: Arc::new(AtomicU32::new(0)),
            stream_connections: Arc::new(AtomicU32::new(0)),
            push,
        };

        let router = Router::new()
            .route("/api/feed", get(feed_handler))
            .route("/api/feed/stream", get(stream_handler))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        Self {
            origin: format!("http://{addr}"),
            state,
        }
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Answer snapshot requests with `code`; 200 serves the snapshot again.
    pub fn fail_snapshot_with(&self, code: u16) {
        self.state.snapshot_status.store(code, Ordering::SeqCst);
    }

    pub fn snapshot_requests(&self) -> u32 {
        self.state.snapshot_requests.load(Ordering::SeqCst)
    }

    /// Stream connections that are subscribed to pushes.
    pub fn stream_connections(&self) -> u32 {
        self.state.stream_connections.load(Ordering::SeqCst)
    }

    pub fn push(&self, frame: PushFrame) {
        let _ = self.state.push.send(frame);
    }

    pub fn push_message(&self, record: Value) {
        self.push(PushFrame::Text(record.to_string()));
    }
}

async fn feed_handler(
    State(state): State<OriginState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let status = state.snapshot_status.load(Ordering::SeqCst);
    state.snapshot_requests.fetch_add(1, Ordering::SeqCst);

    if status != 200 {
        let code = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return (code, "snapshot unavailable").into_response();
    }

    let limit = params
        .get("limit")
        .and_then(|l| l.parse::<usize>().ok())
        .unwrap_or(50);
    let records: Vec<Value> = state.snapshot.iter().take(limit).cloned().collect();
    Json(Value::Array(records)).into_response()
}

async fn stream_handler(State(state): State<OriginState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_stream(socket, state))
}

async fn handle_stream(socket: WebSocket, state: OriginState) {
    let mut pushes = state.push.subscribe();
    state.stream_connections.fetch_add(1, Ordering::SeqCst);

    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            frame = pushes.recv() => match frame {
                Ok(PushFrame::Text(text)) => {
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Ok(PushFrame::Close) => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
                Err(_) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
        }
    }
}

/// A snapshot/stream record.
pub fn record(id: i64, body: &str, created_at: &str) -> Value {
    json!({
        "id": id,
        "body": body,
        "created_at": created_at,
        "channel": { "id": 7, "name": "Alpha Calls" },
    })
}
