//! Error types for the engine client

use thiserror::Error;

/// Errors that can occur when talking to a graph analytics engine
#[derive(Error, Debug)]
pub enum EngineError {
    /// Network failure or timeout that may succeed when retried
    #[error("Transient connection error: {0}")]
    Transient(String),

    /// A vertex or edge collection named in a load request does not exist
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    /// The engine reported that an algorithm job failed
    #[error("Remote job error: {0}")]
    RemoteJob(String),

    /// Engine, graph or job handle unknown to the service
    #[error("Not found: {0}")]
    NotFound(String),

    /// Non-success HTTP response that carries no more specific meaning
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Operation not offered by this deployment variant
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    /// Whether retrying the same request may succeed.
    ///
    /// Connect failures, timeouts, 429 and 5xx responses are transient.
    /// Everything else (missing collections, job failures, 4xx) is fatal.
    pub fn is_transient(&self) -> bool {
        match self {
            EngineError::Transient(_) => true,
            EngineError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            EngineError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
