use crate::state::SessionState;
use thiserror::Error;

/// A convenience `Result` alias using [`RtviError`].
pub type RtviResult<T> = Result<T, RtviError>;

/// Error taxonomy shared by every RTVI crate.
///
/// Variants split into three groups: failures that end a session
/// (`Transport`, `Timeout`), failures scoped to a single call
/// (`Backend`, `Cancelled`, `Protocol`), and local misuse that never
/// reaches the network (`Configuration`, `InvalidState`, `HelperNotFound`).
#[derive(Error, Debug)]
pub enum RtviError {
    /// Bad or missing input detected before any I/O.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The transport or the provisioning call failed while connecting or connected.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The backend did not signal readiness within the allowed time.
    #[error("Timed out after {timeout_ms}ms waiting for the bot to become ready")]
    Timeout {
        /// The readiness timeout that elapsed, in milliseconds.
        timeout_ms: u64,
    },

    /// A structurally valid backend response reporting an application-level failure.
    #[error("Backend error: {detail}")]
    Backend {
        /// Error detail as reported by the backend.
        detail: String,
    },

    /// An operation was attempted in a state that does not allow it.
    #[error("Cannot {operation} while session is {state}")]
    InvalidState {
        /// State the session was in when the operation was attempted.
        state: SessionState,
        /// The rejected operation.
        operation: &'static str,
    },

    /// No helper is registered for the requested service.
    #[error("No helper registered for service '{0}'")]
    HelperNotFound(String),

    /// In-flight work was invalidated by a disconnect.
    #[error("Operation cancelled: session disconnected")]
    Cancelled,

    /// An inbound frame did not match any known message shape.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// An HTTP-level failure outside the session lifecycle (e.g. the proxy forwarding call).
    #[error("HTTP error: {0}")]
    Http(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RtviError {
    /// Whether this error ends the session that produced it.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_state_message() {
        let err = RtviError::InvalidState {
            state: SessionState::Connecting,
            operation: "send",
        };
        assert_eq!(err.to_string(), "Cannot send while session is connecting");
    }

    #[test]
    fn test_fatal_classification() {
        assert!(RtviError::Timeout { timeout_ms: 10 }.is_fatal());
        assert!(RtviError::Transport("closed".into()).is_fatal());
        assert!(!RtviError::Backend { detail: "x".into() }.is_fatal());
        assert!(!RtviError::Cancelled.is_fatal());
    }
}
