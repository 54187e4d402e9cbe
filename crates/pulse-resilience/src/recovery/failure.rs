//! Failures observed on the broadcast path.

use std::time::Duration;

use thiserror::Error;

use pulse_core::error::{AppError, ErrorKind as AppErrorKind};

use crate::circuit_breaker::CircuitOpenError;

/// A failure before classification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Failure {
    /// Missing, malformed, or rejected credentials.
    #[error("authentication failed: {0}")]
    AuthFailure(String),
    /// A reset, broken pipe, closed channel, or similar I/O failure.
    #[error("transient I/O failure: {0}")]
    TransientIo(String),
    /// An operation exceeded its deadline.
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    /// A bounded buffer or connection limit was full.
    #[error("capacity exceeded: {0}")]
    CapacityExceeded(String),
    /// A peer sent something that does not follow the message protocol.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
    /// A circuit breaker rejected the call.
    #[error(transparent)]
    CircuitOpen(#[from] CircuitOpenError),
    /// Anything not covered above.
    #[error("unclassified failure: {0}")]
    Unclassified(String),
    /// A background task panicked.
    #[error("task panicked: {0}")]
    TaskPanicked(String),
}

impl Failure {
    /// A closed or vanished delivery channel.
    pub fn channel_closed(what: impl std::fmt::Display) -> Self {
        Self::TransientIo(format!("{what} closed"))
    }
}

impl From<&AppError> for Failure {
    fn from(err: &AppError) -> Self {
        let message = err.message.clone();
        match err.kind {
            AppErrorKind::Authentication => Self::AuthFailure(message),
            AppErrorKind::CapacityExceeded => Self::CapacityExceeded(message),
            AppErrorKind::Validation | AppErrorKind::Serialization => {
                Self::ProtocolViolation(message)
            }
            AppErrorKind::Timeout
            | AppErrorKind::Io
            | AppErrorKind::ExternalService
            | AppErrorKind::ServiceUnavailable => Self::TransientIo(message),
            AppErrorKind::NotFound | AppErrorKind::Internal | AppErrorKind::Configuration => {
                Self::Unclassified(err.to_string())
            }
        }
    }
}

impl From<AppError> for Failure {
    fn from(err: AppError) -> Self {
        Self::from(&err)
    }
}

impl From<std::io::Error> for Failure {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind as Io;
        match err.kind() {
            Io::ConnectionReset
            | Io::ConnectionAborted
            | Io::BrokenPipe
            | Io::NotConnected
            | Io::UnexpectedEof
            | Io::Interrupted
            | Io::WouldBlock
            | Io::TimedOut => Self::TransientIo(err.to_string()),
            Io::InvalidData | Io::InvalidInput => Self::ProtocolViolation(err.to_string()),
            _ => Self::Unclassified(err.to_string()),
        }
    }
}

impl From<tokio::task::JoinError> for Failure {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_panic() {
            Self::TaskPanicked(err.to_string())
        } else {
            Self::Unclassified(format!("task cancelled: {err}"))
        }
    }
}

impl From<serde_json::Error> for Failure {
    fn from(err: serde_json::Error) -> Self {
        Self::ProtocolViolation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_mapping() {
        assert!(matches!(
            Failure::from(AppError::authentication("bad token")),
            Failure::AuthFailure(m) if m == "bad token"
        ));
        assert!(matches!(
            Failure::from(AppError::external_service("sysinfo")),
            Failure::TransientIo(_)
        ));
        assert!(matches!(
            Failure::from(AppError::internal("bug")),
            Failure::Unclassified(_)
        ));
    }

    #[test]
    fn test_io_error_mapping() {
        let reset = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        assert!(matches!(Failure::from(reset), Failure::TransientIo(_)));
        let invalid = std::io::Error::new(std::io::ErrorKind::InvalidData, "junk");
        assert!(matches!(Failure::from(invalid), Failure::ProtocolViolation(_)));
    }

    #[tokio::test]
    async fn test_panicked_task_maps_to_task_panicked() {
        let err = tokio::spawn(async { panic!("boom") }).await.unwrap_err();
        assert!(matches!(Failure::from(err), Failure::TaskPanicked(_)));
    }
}
