//! HTTP client for the feed snapshot endpoint.

use crate::error::{FetchError, FetchResult};
use callfeed_core::Message;
use callfeed_telemetry::Metrics;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default number of messages requested.
pub const DEFAULT_LIMIT: usize = 50;

/// Default timeout for the snapshot request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for fetching the most recent feed messages.
pub struct SnapshotClient {
    /// HTTP client.
    client: Client,
    /// Feed endpoint URL (`{origin}/api/feed`).
    feed_url: String,
}

impl SnapshotClient {
    /// Create a new snapshot client.
    ///
    /// # Arguments
    /// * `origin` - Base origin of the API (e.g., "http://localhost:8000")
    /// * `timeout` - Whole-request timeout, surfaced as `FetchError::Timeout`
    pub fn new(origin: &str, timeout: Duration) -> FetchResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::HttpClient(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            feed_url: format!("{}/api/feed", origin.trim_end_matches('/')),
        })
    }

    /// Endpoint this client requests.
    pub fn feed_url(&self) -> &str {
        &self.feed_url
    }

    /// Fetch up to `limit` most recent messages, newest-first.
    ///
    /// A single malformed record fails the whole fetch.
    pub async fn fetch_recent(&self, limit: usize) -> FetchResult<Vec<Message>> {
        let url = format!("{}?limit={limit}", self.feed_url);
        info!(url = %url, "Fetching feed snapshot");

        let response = self.client.get(&url).send().await.map_err(map_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Snapshot request rejected");
            return Err(FetchError::Status {
                code: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await.map_err(map_reqwest)?;
        let body: serde_json::Value = serde_json::from_slice(&bytes)
            .map_err(|e| FetchError::Malformed(format!("Failed to parse response: {e}")))?;

        let records = body
            .as_array()
            .ok_or_else(|| FetchError::Malformed("snapshot response is not an array".to_string()))?;

        let mut messages = Vec::with_capacity(records.len());
        for (idx, record) in records.iter().enumerate() {
            match Message::from_value(record) {
                Ok(msg) => messages.push(msg),
                Err(e) => {
                    Metrics::message_malformed("snapshot");
                    warn!(idx, error = %e, "Malformed record in snapshot");
                    return Err(FetchError::Malformed(format!("record {idx}: {e}")));
                }
            }
        }

        // Stable sort keeps server order among equal timestamps.
        messages.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if messages.len() > limit {
            debug!(
                received = messages.len(),
                limit, "Server returned more than requested, truncating"
            );
            messages.truncate(limit);
        }

        info!(count = messages.len(), "Fetched feed snapshot");
        Ok(messages)
    }
}

fn map_reqwest(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else if e.is_decode() {
        FetchError::Malformed(e.to_string())
    } else {
        FetchError::Network(e.to_string())
    }
}
