//! Error types for loopwire

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Main error type for loopwire
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Unsupported feature: {0}")]
    Unsupported(String),

    #[error("Timed out after {0:?} without input")]
    Timeout(Duration),

    #[error("Stream [{0}] was dropped before terminating")]
    Abandoned(String),

    #[error("Resource [{0}] was detached before it could complete")]
    Detached(String),

    #[error("No tokio runtime available: {0}")]
    NoRuntime(String),
}

impl Error {
    /// Whether this is the failure produced by the timeout combinator
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout(_))
    }
}

/// Errors carried by stream failures; every subscriber and the completion
/// future observe the same value.
pub type SharedError = Arc<Error>;

/// Result type alias for loopwire
pub type Result<T> = std::result::Result<T, Error>;
