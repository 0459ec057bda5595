//! Error types for statcache

use std::io;

use thiserror::Error;

/// Result type alias for statcache
pub type Result<T> = std::result::Result<T, Error>;

/// statcache errors
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Upstream answered with a non-2xx status
    #[error("{endpoint} returned HTTP {status}")]
    Status {
        /// Endpoint that was requested
        endpoint: String,
        /// Status code returned
        status: u16,
    },

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Requested entity or data kind does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Durable storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// HTTP status code a server handler should answer with for this error
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::Status { status, .. } => *status,
            Self::Http(_) => 502,
            _ => 500,
        }
    }

    /// Whether the failure came from the network seam (transport or status)
    #[must_use]
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Status { .. })
    }
}
