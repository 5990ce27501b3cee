//! Failure classification.
//!
//! Classification is a pure function of the transport error and a snapshot
//! of the connectivity monitor. It never touches the queue, cache or
//! credentials; callers act on the returned class.

use crate::transport::TransportError;

/// Why a network attempt failed, from the sync layer's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureClass {
    /// The backend is (probably) unreachable. Handled locally.
    Connectivity,
    /// Credentials were rejected while online.
    Auth,
    /// Anything else: server errors, validation errors, bad requests.
    Other,
}

impl FailureClass {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureClass::Connectivity => "connectivity",
            FailureClass::Auth => "auth",
            FailureClass::Other => "other",
        }
    }
}

impl std::fmt::Display for FailureClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a failed attempt.
///
/// When `is_online` is false the result is always [`FailureClass::Connectivity`],
/// whatever the status code: a stale 401 seen while the link is down must not
/// log the user out. While online only the monitor's word counts, so a
/// timeout is an ordinary failure.
pub fn classify(error: &TransportError, is_online: bool) -> FailureClass {
    if !is_online {
        return FailureClass::Connectivity;
    }
    match error {
        TransportError::Status { status: 401, .. } => FailureClass::Auth,
        _ => FailureClass::Other,
    }
}

/// Whether a replayed request was rejected in a way retrying will not fix.
///
/// 4xx responses count, except 401 (handled as auth), 408 and 429.
pub fn is_permanent_rejection(error: &TransportError) -> bool {
    match error {
        TransportError::Status { status, .. } => (400..500).contains(status) && !matches!(status, 401 | 408 | 429),
        TransportError::InvalidRequest(_) => true,
        TransportError::Network(_) | TransportError::Timeout => false,
    }
}
