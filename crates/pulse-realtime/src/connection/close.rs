//! Why a connection ended.

use std::fmt;

use pulse_resilience::Failure;

/// WebSocket close codes used by the server.
pub mod close_code {
    /// Normal closure.
    pub const NORMAL: u16 = 1000;
    /// Server going down.
    pub const AWAY: u16 = 1001;
    /// Policy violation (bad credentials, malformed messages).
    pub const POLICY: u16 = 1008;
    /// Server at capacity, try again later.
    pub const AGAIN: u16 = 1013;
}

/// Longest reason a close frame can carry: 125 payload bytes minus the code.
pub const MAX_CLOSE_REASON_BYTES: usize = 123;

/// Cut `reason` to fit in a close frame without splitting a character.
pub fn close_frame_reason(reason: &str) -> &str {
    if reason.len() <= MAX_CLOSE_REASON_BYTES {
        return reason;
    }
    let mut end = MAX_CLOSE_REASON_BYTES;
    while !reason.is_char_boundary(end) {
        end -= 1;
    }
    &reason[..end]
}

/// The reason a connection left the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The client closed the socket.
    ClientClosed,
    /// The client sent a malformed or unsupported message.
    ProtocolViolation(String),
    /// No client activity within the idle timeout.
    IdleTimeout,
    /// A broadcast delivery failed.
    DeliveryFailed(Failure),
    /// Reading from or writing to the socket failed.
    TransportError(String),
    /// The server is shutting down.
    Shutdown,
}

impl CloseReason {
    /// Whether buffered frames should still be flushed before closing.
    pub fn is_graceful(&self) -> bool {
        matches!(
            self,
            Self::ClientClosed | Self::ProtocolViolation(_) | Self::IdleTimeout | Self::Shutdown
        )
    }

    /// Close frame code to send, if the socket is still usable.
    pub fn close_code(&self) -> Option<u16> {
        match self {
            Self::ProtocolViolation(_) => Some(close_code::POLICY),
            Self::IdleTimeout => Some(close_code::NORMAL),
            Self::Shutdown => Some(close_code::AWAY),
            Self::ClientClosed | Self::DeliveryFailed(_) | Self::TransportError(_) => None,
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClientClosed => write!(f, "client closed"),
            Self::ProtocolViolation(detail) => write!(f, "protocol violation: {detail}"),
            Self::IdleTimeout => write!(f, "idle timeout"),
            Self::DeliveryFailed(failure) => write!(f, "delivery failed: {failure}"),
            Self::TransportError(detail) => write!(f, "transport error: {detail}"),
            Self::Shutdown => write!(f, "server shutdown"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_reason_is_kept() {
        assert_eq!(close_frame_reason("idle timeout"), "idle timeout");
    }

    #[test]
    fn test_long_reason_is_cut_to_frame_limit() {
        let reason = format!("protocol violation: {}", "x".repeat(300));
        let cut = close_frame_reason(&reason);
        assert_eq!(cut.len(), MAX_CLOSE_REASON_BYTES);
        assert!(reason.starts_with(cut));
    }

    #[test]
    fn test_cut_respects_char_boundaries() {
        let reason = "é".repeat(100);
        let cut = close_frame_reason(&reason);
        assert_eq!(cut.len(), 122);
        assert_eq!(cut.chars().count(), 61);
    }
}
