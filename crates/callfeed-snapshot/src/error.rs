//! Snapshot fetch error types.

use callfeed_core::MalformedMessage;
use thiserror::Error;

/// Snapshot request failed or returned unusable data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Snapshot request timed out")]
    Timeout,

    #[error("HTTP {code}: {body}")]
    Status { code: u16, body: String },

    #[error("Malformed snapshot: {0}")]
    Malformed(String),

    #[error("HTTP client error: {0}")]
    HttpClient(String),
}

impl FetchError {
    /// Transient failures worth retrying (network, timeout, 5xx).
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout => true,
            Self::Status { code, .. } => *code >= 500,
            Self::Malformed(_) | Self::HttpClient(_) => false,
        }
    }

    /// Metric label for this failure.
    pub fn outcome_label(&self) -> &'static str {
        match self {
            Self::Network(_) => "network",
            Self::Timeout => "timeout",
            Self::Status { .. } => "status",
            Self::Malformed(_) => "malformed",
            Self::HttpClient(_) => "client",
        }
    }
}

impl From<MalformedMessage> for FetchError {
    fn from(e: MalformedMessage) -> Self {
        Self::Malformed(e.to_string())
    }
}

pub type FetchResult<T> = Result<T, FetchError>;

/// Metric label for a fetch outcome: `ok` or the failure's label.
pub fn outcome_label<T>(result: &FetchResult<T>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(e) => e.outcome_label(),
    }
}
