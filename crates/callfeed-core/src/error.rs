//! Error types for callfeed-core.

use thiserror::Error;

/// A single wire record that could not be turned into a `Message`.
///
/// Never fatal on its own: the snapshot fetcher folds it into a fetch
/// failure, the stream subscriber logs it and skips the frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedMessage {
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Record is not a JSON object")]
    NotAnObject,

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("Unparsable timestamp: {0}")]
    InvalidTimestamp(String),
}

/// Result type alias for message parsing.
pub type ParseResult<T> = std::result::Result<T, MalformedMessage>;
