//! Application configuration.

use crate::error::{AppError, AppResult};
use callfeed_feed::FeedConfig;
use callfeed_ws::{stream_url_for_origin, ReconnectPolicy, StreamConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default config file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Environment variable selecting the config file.
pub const CONFIG_ENV: &str = "CALLFEED_CONFIG";

/// Environment variable overriding the API origin.
pub const ORIGIN_ENV: &str = "CALLFEED_API_URL";

/// Snapshot request settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// Number of recent messages requested.
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Request timeout (ms).
    #[serde(default = "default_snapshot_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_limit() -> usize {
    callfeed_snapshot::DEFAULT_LIMIT
}

fn default_snapshot_timeout_ms() -> u64 {
    10_000
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            timeout_ms: default_snapshot_timeout_ms(),
        }
    }
}

/// WebSocket configuration subset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsConfig {
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Idle time before a ping (ms, 0 = off).
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,
    /// Reconnect automatically after the stream is lost.
    #[serde(default = "default_reconnect_enabled")]
    pub reconnect_enabled: bool,
    /// Maximum consecutive reconnection attempts (0 = infinite).
    #[serde(default)]
    pub max_reconnect_attempts: u32,
    /// Base delay for reconnection backoff (ms).
    #[serde(default = "default_reconnect_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,
    #[serde(default = "default_reconnect_max_delay_ms")]
    pub reconnect_max_delay_ms: u64,
    #[serde(default = "default_reconnect_jitter_ms")]
    pub reconnect_jitter_ms: u64,
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_heartbeat_interval_ms() -> u64 {
    45_000
}

fn default_heartbeat_timeout_ms() -> u64 {
    10_000
}

fn default_reconnect_enabled() -> bool {
    true
}

fn default_reconnect_base_delay_ms() -> u64 {
    1000
}

fn default_reconnect_max_delay_ms() -> u64 {
    30_000
}

fn default_reconnect_jitter_ms() -> u64 {
    1000
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            heartbeat_timeout_ms: default_heartbeat_timeout_ms(),
            reconnect_enabled: default_reconnect_enabled(),
            max_reconnect_attempts: 0,
            reconnect_base_delay_ms: default_reconnect_base_delay_ms(),
            reconnect_max_delay_ms: default_reconnect_max_delay_ms(),
            reconnect_jitter_ms: default_reconnect_jitter_ms(),
        }
    }
}

impl From<WsConfig> for StreamConfig {
    fn from(cfg: WsConfig) -> Self {
        Self {
            url: String::new(), // Set separately from origin
            connect_timeout_ms: cfg.connect_timeout_ms,
            heartbeat_interval_ms: cfg.heartbeat_interval_ms,
            heartbeat_timeout_ms: cfg.heartbeat_timeout_ms,
            ..StreamConfig::default()
        }
    }
}

impl From<WsConfig> for ReconnectPolicy {
    fn from(cfg: WsConfig) -> Self {
        Self {
            enabled: cfg.reconnect_enabled,
            max_attempts: cfg.max_reconnect_attempts,
            base_delay_ms: cfg.reconnect_base_delay_ms,
            max_delay_ms: cfg.reconnect_max_delay_ms,
            jitter_ms: cfg.reconnect_jitter_ms,
        }
    }
}

/// Owner-side feed behaviour.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedSection {
    /// Re-request the snapshot after a retryable failure (ms, 0 = never).
    #[serde(default)]
    pub snapshot_retry_interval_ms: u64,
}

/// Terminal rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Rows drawn per frame.
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,
    /// chrono format string for message timestamps.
    #[serde(default = "default_time_format")]
    pub time_format: String,
    /// Show timestamps in the local timezone instead of UTC.
    #[serde(default = "default_local_time")]
    pub local_time: bool,
    /// Clear the terminal before each frame.
    #[serde(default)]
    pub clear_screen: bool,
}

fn default_max_rows() -> usize {
    20
}

fn default_time_format() -> String {
    "%H:%M:%S %d-%b-%Y".to_string()
}

fn default_local_time() -> bool {
    true
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            max_rows: default_max_rows(),
            time_format: default_time_format(),
            local_time: default_local_time(),
            clear_screen: false,
        }
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API origin, e.g. `http://localhost:8000`.
    #[serde(default = "default_origin")]
    pub origin: String,
    #[serde(default)]
    pub snapshot: SnapshotConfig,
    #[serde(default)]
    pub websocket: WsConfig,
    #[serde(default)]
    pub feed: FeedSection,
    #[serde(default)]
    pub render: RenderConfig,
}

fn default_origin() -> String {
    "http://localhost:8000".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            origin: default_origin(),
            snapshot: SnapshotConfig::default(),
            websocket: WsConfig::default(),
            feed: FeedSection::default(),
            render: RenderConfig::default(),
        }
    }
}

impl AppConfig {
    /// Resolve and load configuration.
    ///
    /// Path: `explicit` > `CALLFEED_CONFIG` > `config/default.toml`. A missing
    /// default file yields defaults; a missing explicit file is an error.
    /// `CALLFEED_API_URL` then overrides the origin.
    pub fn load(explicit: Option<&str>) -> AppResult<Self> {
        let requested = explicit
            .map(str::to_string)
            .or_else(|| std::env::var(CONFIG_ENV).ok());

        let mut config = match requested {
            Some(path) => Self::from_file(&path)?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::from_file(DEFAULT_CONFIG_PATH)?
            }
            None => {
                tracing::warn!(path = DEFAULT_CONFIG_PATH, "Config file not found, using defaults");
                Self::default()
            }
        };

        config.override_origin(std::env::var(ORIGIN_ENV).ok());
        Ok(config)
    }

    /// Load from a specific file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config {path}: {e}")))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> AppResult<Self> {
        toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))
    }

    /// Replace the origin when an override is present and non-empty.
    pub fn override_origin(&mut self, origin: Option<String>) {
        if let Some(origin) = origin.filter(|o| !o.trim().is_empty()) {
            self.origin = origin.trim().to_string();
        }
    }

    /// Reject configurations the feed cannot run with.
    pub fn validate(&self) -> AppResult<()> {
        if !(self.origin.starts_with("http://") || self.origin.starts_with("https://")) {
            return Err(AppError::Config(format!(
                "origin must be an http(s) URL, got {:?}",
                self.origin
            )));
        }
        if self.snapshot.limit == 0 {
            return Err(AppError::Config("snapshot.limit must be at least 1".to_string()));
        }
        if self.snapshot.timeout_ms == 0 {
            return Err(AppError::Config(
                "snapshot.timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn snapshot_timeout(&self) -> Duration {
        Duration::from_millis(self.snapshot.timeout_ms)
    }

    /// Stream settings with the URL derived from the origin.
    pub fn stream_config(&self) -> StreamConfig {
        let mut stream: StreamConfig = self.websocket.clone().into();
        stream.url = stream_url_for_origin(&self.origin);
        stream
    }

    pub fn feed_config(&self) -> FeedConfig {
        FeedConfig {
            limit: self.snapshot.limit,
            snapshot_timeout_ms: self.snapshot.timeout_ms,
            reconnect: self.websocket.clone().into(),
        }
    }
}
