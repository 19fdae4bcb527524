//! Error types for the assistant.

use thiserror::Error;

/// Crate-wide error type.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Invalid configuration or unsupported values.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Session identifier rejected (empty, too long, or not path-safe).
    #[error("invalid session id: {0}")]
    InvalidSessionId(String),
    /// The external schema endpoint answered without the expected `schema` key.
    #[error("schema contract violated: {0}")]
    SchemaContract(String),
    /// The completion provider failed or answered with an unusable body.
    #[error("completion error: {0}")]
    Completion(String),
    /// Completion error surfaced by Rig.
    #[error("completion error: {0}")]
    RigCompletion(#[from] rig::completion::CompletionError),
    /// HTTP client error from Rig.
    #[error("http client error: {0}")]
    RigHttpClient(#[from] rig::http_client::Error),
    /// HTTP request failed.
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Remote tool delegate answered with a non-success status.
    #[error("tool delegate returned status {0}")]
    ToolStatus(u16),
    /// MongoDB driver error.
    #[error("database error: {0}")]
    Database(#[from] mongodb::error::Error),
    /// A query stage or value could not be converted to BSON.
    #[error("bson conversion error: {0}")]
    Bson(String),
    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// URL parse error.
    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result alias.
pub type AgentResult<T> = Result<T, AgentError>;
