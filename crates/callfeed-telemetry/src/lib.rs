//! Prometheus metrics and structured logging for the calls feed.
//!
//! - Structured logging with tracing (JSON in production, pretty otherwise)
//! - Prometheus metrics for snapshot fetches, stream health and merge outcomes

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;
