//! Error types for the headless engine core.

use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the headless engine core.
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to initialize the engine or a page.
    #[error("initialization failed: {0}")]
    InitializationError(String),

    /// Failed to load a URL.
    #[error("failed to load URL: {0}")]
    LoadError(String),

    /// A URL or robots.txt body could not be parsed.
    #[error("parse error: {0}")]
    ParseError(String),

    /// Failed to execute JavaScript (classic script, module, or listener callback).
    #[error("script execution failed: {0}")]
    ScriptError(String),

    /// Operation timed out.
    #[error("operation timed out after {0}ms")]
    Timeout(u64),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    ConfigError(String),

    /// Network error (including a non-200 response).
    #[error("network error: {0}")]
    NetworkError(String),

    /// A caller violated the external-interface protocol (e.g. enqueuing on a
    /// stream that is no longer readable).
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// A queued navigation aborted the page that was in flight.
    #[error("navigation aborted: {0}")]
    NavigationAborted(String),

    /// Generic error, used sparingly for ambient/CLI plumbing.
    #[error("{0}")]
    Other(String),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::NetworkError(err.to_string())
    }
}
