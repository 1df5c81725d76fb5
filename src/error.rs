//! Crate-level error types.
//!
//! [`KrillError`] unifies every error source (configuration, WebSocket,
//! JSON, storage) behind a single enum so callers can match on the variant
//! they care about while still using the `?` operator for easy propagation.

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, KrillError>;

/// Top-level error type returned by all public APIs.
#[derive(Debug, thiserror::Error)]
pub enum KrillError {
    /// A required configuration value is missing or invalid. Fatal at
    /// startup; the process never runs partially configured.
    #[error("configuration error: {0}")]
    Config(String),

    /// A WebSocket operation (connect, send, receive) failed.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A single exchange message could not be normalized. The offending
    /// message is dropped and the stream continues.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// A storage operation failed. Retried at the batch level.
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// Every flush retry for a batch failed. Fatal; the pipeline shuts
    /// down rather than accumulate unflushed data indefinitely.
    #[error("storage unrecoverable after {attempts} flush attempts: {last}")]
    StorageExhausted { attempts: u32, last: String },
}
