//! Error types for the adapter boundary.

use std::time::Duration;

use specguard_core::Protocol;

/// Failures at the adapter boundary. Each one ends the episode as
/// `adapter_error`; none is retried.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("adapter call timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("malformed adapter response: {0}")]
    Malformed(String),

    #[error("action '{action}' is not allowed under protocol {protocol}")]
    IllegalAction { protocol: Protocol, action: String },

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("adapter process failed: {0}")]
    Process(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("adapter configuration error: {0}")]
    Config(String),

    #[error("unknown adapter: {0}")]
    UnknownAdapter(String),

    #[error("duplicate adapter registration: {0}")]
    DuplicateAdapter(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for AdapterError {
    fn from(err: reqwest::Error) -> Self {
        AdapterError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for AdapterError {
    fn from(err: serde_json::Error) -> Self {
        AdapterError::Malformed(err.to_string())
    }
}

/// Result type for adapter operations.
pub type AdapterResult<T> = std::result::Result<T, AdapterError>;
