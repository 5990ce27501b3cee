//! CLI errors and exit codes.

use std::process::ExitCode;

use tripsync_core::{ConfigError, Error};

/// Errors raised by argument handling before anything reaches the engine.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Malformed method, body or path.
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),
}

/// Map a failure to a process exit code.
///
/// 2 for bad input, 3 for rejected credentials, 4 for storage failures,
/// 1 for everything else.
pub fn exit_code(err: &anyhow::Error) -> ExitCode {
    if err.downcast_ref::<CliError>().is_some() || err.downcast_ref::<ConfigError>().is_some() {
        return ExitCode::from(2);
    }
    match err.downcast_ref::<Error>() {
        Some(Error::InvalidRequest(_)) | Some(Error::Config(_)) => ExitCode::from(2),
        Some(Error::AuthFailed { .. }) => ExitCode::from(3),
        Some(e) if e.is_storage() => ExitCode::from(4),
        _ => ExitCode::FAILURE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code(&CliError::InvalidInput("x".into()).into()), ExitCode::from(2));
        assert_eq!(exit_code(&Error::AuthFailed { status: 401, message: String::new() }.into()), ExitCode::from(3));
        assert_eq!(exit_code(&Error::StorageUnavailable("disk".into()).into()), ExitCode::from(4));
        assert_eq!(exit_code(&anyhow::anyhow!("boom")), ExitCode::FAILURE);
    }
}
