//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Snapshot client error: {0}")]
    Snapshot(#[from] callfeed_snapshot::FetchError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] callfeed_telemetry::TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
