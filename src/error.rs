//! Error taxonomy for the pipeline.
//!
//! Remote-provider failures (`RemoteService`, `RateLimited`, `Timeout`)
//! and store failures (`StoreConnection`, `StoreWrite`, `StoreQuery`)
//! are kept as distinct variants so callers can decide what is worth
//! retrying. The binary boundary converts everything into `anyhow` and
//! exits with code 1.

use std::io::Error as IoError;

use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while chunking, embedding, storing, or querying.
#[derive(Debug, Error)]
pub enum Error {
    /// A caller-supplied argument was rejected (bad chunk size, empty query).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An input file does not exist.
    #[error("file not found: {0}")]
    FileNotFound(String),

    /// The embedding provider returned an error response.
    #[error("embedding provider error: {0}")]
    RemoteService(String),

    /// The embedding provider throttled the request (HTTP 429).
    #[error("embedding provider rate limited: {0}")]
    RateLimited(String),

    /// The embedding call exceeded its deadline.
    #[error("embedding request timed out: {0}")]
    Timeout(String),

    /// The vector store connection could not be opened or is closed.
    #[error("store connection error: {0}")]
    StoreConnection(String),

    /// A write to the vector store failed (the batch is rolled back).
    #[error("store write error: {0}")]
    StoreWrite(String),

    /// A read/search against the vector store failed.
    #[error("store query error: {0}")]
    StoreQuery(String),

    /// An I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization or deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] SerdeJsonError),

    /// Configuration is invalid or missing.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether a retry of the same call may succeed.
    ///
    /// Rate limiting and timeouts are transient; everything else either
    /// reflects caller input or requires operator intervention.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited(_) | Self::Timeout(_))
    }
}
