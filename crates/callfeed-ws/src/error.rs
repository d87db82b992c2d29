//! Stream error types.

use thiserror::Error;

/// Stream connection failed to establish or was lost after opening.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    #[error("Invalid stream URL: {0}")]
    InvalidUrl(String),

    #[error("Connection failed: {0}")]
    ConnectFailed(String),

    #[error("Connection attempt timed out")]
    ConnectTimeout,

    #[error("Connection closed: code={code}, reason={reason}")]
    Dropped { code: u16, reason: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Heartbeat timeout")]
    HeartbeatTimeout,
}

impl StreamError {
    /// Metric label for this failure.
    pub fn reason_label(&self) -> &'static str {
        match self {
            Self::InvalidUrl(_) => "invalid_url",
            Self::ConnectFailed(_) => "connect_failed",
            Self::ConnectTimeout => "connect_timeout",
            Self::Dropped { .. } => "dropped",
            Self::Transport(_) => "transport",
            Self::HeartbeatTimeout => "heartbeat_timeout",
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for StreamError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Transport(e.to_string())
    }
}
