//! Mock WebSocket server for integration tests.
//!
//! Every accepted connection replays the same script of frames, then
//! either holds the connection open or closes it. The server records
//! how many connections it saw and how many clients closed cleanly.

use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

/// One step of a connection script.
#[derive(Debug, Clone)]
pub enum ServerFrame {
    Text(String),
    /// Pause before the next step.
    Sleep(Duration),
    /// Send a Close frame and end the connection.
    Close(u16, String),
    /// Drop the TCP stream without a Close frame.
    Abort,
}

/// A scripted mock WebSocket server.
pub struct MockWsServer {
    addr: SocketAddr,
    shutdown_tx: mpsc::Sender<()>,
    connections: Arc<AtomicU32>,
    client_closes: Arc<AtomicU32>,
}

impl MockWsServer {
    /// Start a server on an available port that plays `script` per connection.
    pub async fn start(script: Vec<ServerFrame>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connections = Arc::new(AtomicU32::new(0));
        let client_closes = Arc::new(AtomicU32::new(0));
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let connections_clone = connections.clone();
        let closes_clone = client_closes.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Ok((stream, _)) = listener.accept() => {
                        connections_clone.fetch_add(1, Ordering::SeqCst);
                        tokio::spawn(handle_connection(
                            stream,
                            script.clone(),
                            closes_clone.clone(),
                        ));
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }
        });

        Self {
            addr,
            shutdown_tx,
            connections,
            client_closes,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}/api/feed/stream", self.addr)
    }

    pub fn connection_count(&self) -> u32 {
        self.connections.load(Ordering::SeqCst)
    }

    /// Connections the client ended with a Close frame.
    pub fn client_close_count(&self) -> u32 {
        self.client_closes.load(Ordering::SeqCst)
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

async fn handle_connection(stream: TcpStream, script: Vec<ServerFrame>, closes: Arc<AtomicU32>) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            eprintln!("WebSocket handshake failed: {}", e);
            return;
        }
    };

    let (mut write, mut read) = ws_stream.split();

    for step in script {
        match step {
            ServerFrame::Text(text) => {
                if write.send(Message::Text(text)).await.is_err() {
                    return;
                }
            }
            ServerFrame::Sleep(d) => tokio::time::sleep(d).await,
            ServerFrame::Close(code, reason) => {
                let frame = CloseFrame {
                    code: CloseCode::from(code),
                    reason: reason.into(),
                };
                let _ = write.send(Message::Close(Some(frame))).await;
                return;
            }
            ServerFrame::Abort => return,
        }
    }

    // Script exhausted: hold the connection until the client leaves.
    while let Some(msg) = read.next().await {
        match msg {
            Ok(Message::Ping(data)) => {
                let _ = write.send(Message::Pong(data)).await;
            }
            Ok(Message::Close(_)) => {
                closes.fetch_add(1, Ordering::SeqCst);
                break;
            }
            Err(_) => break,
            _ => {}
        }
    }
}

/// A valid message frame.
pub fn message_frame(id: u64, body: &str, created_at: &str) -> ServerFrame {
    ServerFrame::Text(
        serde_json::json!({
            "id": id,
            "body": body,
            "created_at": created_at,
            "channel": { "id": 1, "name": "Alpha Calls" },
        })
        .to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_server_starts() {
        let server = MockWsServer::start(Vec::new()).await;
        assert!(server.url().starts_with("ws://127.0.0.1:"));
        server.shutdown().await;
    }
}
