//! Error types for the TV fleet gateway

use thiserror::Error;

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the fleet gateway
///
/// Only pre-dispatch conditions surface through this type; anything that
/// happens while an operation runs against a single TV is captured in that
/// target's `ExecutionResult` instead.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Malformed dispatch request (empty id list, blank ids, oversized batch)
    #[error("invalid request: {0}")]
    Validation(String),

    /// Operation name not registered in the catalog
    #[error("unknown operation: {0}")]
    OperationNotFound(String),

    /// TV id absent from the fleet registry
    #[error("TV not found: {0}")]
    TvNotFound(String),

    /// Token store unreadable or corrupt; fatal at startup
    #[error("token store error: {0}")]
    TokenStore(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
