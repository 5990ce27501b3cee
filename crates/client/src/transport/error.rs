//! Transport error types.

/// Errors from a single network attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The backend could not be reached.
    #[error("network error: {0}")]
    Network(String),

    /// The request timed out.
    #[error("request timeout")]
    Timeout,

    /// The backend answered with a non-success status.
    #[error("HTTP error: {status}")]
    Status { status: u16, body: String },

    /// The request could not be built (bad URL or header).
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl TransportError {
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Short description recorded against queue entries and logs.
    pub fn reason(&self) -> String {
        match self {
            TransportError::Status { status, .. } => format!("status {status}"),
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() { TransportError::Timeout } else { TransportError::Network(err.to_string()) }
    }
}

impl From<TransportError> for tripsync_core::Error {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Status { status, body } => tripsync_core::Error::Http { status, body },
            TransportError::InvalidRequest(msg) => tripsync_core::Error::InvalidRequest(msg),
            other => tripsync_core::Error::Network(other.to_string()),
        }
    }
}
