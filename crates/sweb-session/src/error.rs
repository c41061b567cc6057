//! Error types for session store operations.

use std::path::PathBuf;

/// Error type for session store operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A session was registered with a blank identifier.
    #[error("Cannot create a session with an empty id")]
    EmptySessionId,

    /// A session with the same identifier is already held by the provider.
    #[error("Session already exists: {0}")]
    DuplicateSessionId(String),

    /// No provider was registered under the requested name.
    #[error("Unknown session provider: {0}")]
    UnknownProvider(String),

    /// A provider name was registered twice.
    #[error("Session provider already registered: {0}")]
    DuplicateProvider(String),

    /// The operating system's secure random source failed.
    #[error("Secure random source unavailable: {0}")]
    Entropy(String),

    /// Attribute bag could not be encoded or decoded.
    #[error("Attribute codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// Filesystem error in the persistence layer.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A persistence write did not finish within the configured timeout.
    #[error("Persisting session {0} timed out")]
    PersistTimeout(String),

    /// Background persistence task failed.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Cookie name or value cannot be carried in an HTTP header.
    #[error("Invalid cookie: {0}")]
    InvalidCookie(String),

    /// Provider or manager configuration is unusable.
    #[error("Invalid session configuration: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for session store operations.
pub type Result<T> = std::result::Result<T, Error>;
