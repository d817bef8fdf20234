//! Error types for qstream configuration.
//!
//! Session-level failures live in [`crate::session::SessionError`].

use thiserror::Error;

/// Result type alias using the qstream configuration `Error`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while loading settings.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
