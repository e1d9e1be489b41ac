use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a session.
///
/// ```text
/// Idle -> Initializing -> Connecting -> Ready -> Disconnecting -> Disconnected
///            \________________\___________\__________________-> Error
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Constructed, no transport resources held.
    Idle,
    /// Configuration is being validated and merged.
    Initializing,
    /// Provisioning and transport connection in progress, readiness timer running.
    Connecting,
    /// Backend signalled readiness; sends are accepted.
    Ready,
    /// Explicit disconnect in progress.
    Disconnecting,
    /// Terminal: closed on request.
    Disconnected,
    /// Terminal: closed by a fatal failure.
    Error,
}

impl SessionState {
    /// `Disconnected` and `Error` never transition again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Disconnected | Self::Error)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            (Idle, Initializing)
            | (Initializing, Connecting)
            | (Connecting, Ready)
            | (Disconnecting, Disconnected) => true,
            (Idle | Initializing | Connecting | Ready, Disconnecting) => true,
            (from, Error) => !from.is_terminal(),
            _ => false,
        }
    }

    /// Lowercase name, as used in logs and on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Initializing => "initializing",
            Self::Connecting => "connecting",
            Self::Ready => "ready",
            Self::Disconnecting => "disconnecting",
            Self::Disconnected => "disconnected",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
