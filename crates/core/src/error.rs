//! Unified error types for tripsync.
//!
//! Only failures with no safe local recovery surface here. Connectivity and
//! replay failures are absorbed by the dispatcher and replay engine and turned
//! into queue or cache state instead.

use tokio_rusqlite::rusqlite;

/// Unified error type for the sync core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The persistent store could not be read or written.
    #[error("STORAGE_UNAVAILABLE: {0}")]
    StorageUnavailable(String),

    /// A stored value could not be encoded or decoded.
    #[error("SERIALIZATION: {0}")]
    Serialization(String),

    /// `dequeue_head` was called on an empty queue.
    #[error("QUEUE_EMPTY")]
    QueueEmpty,

    /// The key belongs to the write queue or credential namespace.
    #[error("RESERVED_KEY: {0}")]
    ReservedKey(String),

    /// The request spec is malformed.
    #[error("INVALID_REQUEST: {0}")]
    InvalidRequest(String),

    /// Credentials were rejected while online.
    #[error("AUTH_FAILED: status {status}: {message}")]
    AuthFailed { status: u16, message: String },

    /// Non-auth error response received while online.
    #[error("HTTP_ERROR: status {status}")]
    Http { status: u16, body: String },

    /// Transport failure while the monitor reported online.
    #[error("NETWORK_ERROR: {0}")]
    Network(String),

    /// Configuration could not be loaded or is invalid.
    #[error("CONFIG_ERROR: {0}")]
    Config(String),
}

impl Error {
    /// Whether this error came from the persistent store.
    pub fn is_storage(&self) -> bool {
        matches!(self, Error::StorageUnavailable(_))
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::StorageUnavailable("connection closed".into()),
            tokio_rusqlite::Error::Close(_) => Error::StorageUnavailable("failed to close connection".into()),
            _ => Error::StorageUnavailable("connection closed".into()),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::StorageUnavailable(err.to_string())
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::StorageUnavailable(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
