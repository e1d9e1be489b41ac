//! Inbound and outbound protocol types.
//!
//! These are the transport-independent shapes. Translating backend frames
//! into them is the job of the transport codec.

use crate::config::ConfigOption;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Label stamped on every frame the client sends.
pub const PROTOCOL_LABEL: &str = "rtvi-ai";

/// Message type used to carry an [`OutboundAction`].
pub const ACTION_MESSAGE_TYPE: &str = "action";

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// An event delivered by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    /// The bot is ready to accept traffic.
    Ready,
    /// Speech-to-text output. Partial results arrive with `is_final == false`.
    Transcript {
        /// Transcribed text.
        text: String,
        /// Whether this is the final transcription for the utterance.
        is_final: bool,
    },
    /// A service-specific message, interpreted by the helper for `service_label`.
    GenericMessage {
        /// Service the payload belongs to.
        service_label: String,
        /// Opaque payload.
        payload: serde_json::Value,
    },
    /// The backend reported a failure. Fatal for the session.
    Error {
        /// Error detail as reported by the backend.
        detail: String,
    },
}

impl InboundEvent {
    /// The subscription key of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Ready => EventKind::Ready,
            Self::Transcript { .. } => EventKind::Transcript,
            Self::GenericMessage { .. } => EventKind::GenericMessage,
            Self::Error { .. } => EventKind::Error,
        }
    }
}

/// Discriminant of [`InboundEvent`], used as the event-bus subscription key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// [`InboundEvent::Ready`]
    Ready,
    /// [`InboundEvent::Transcript`]
    Transcript,
    /// [`InboundEvent::GenericMessage`]
    GenericMessage,
    /// [`InboundEvent::Error`]
    Error,
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// A request/response call addressed to one backend service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundAction {
    /// Target service.
    pub service: String,
    /// Action name, e.g. `append_to_messages`.
    pub action: String,
    /// Named arguments in order.
    #[serde(default)]
    pub arguments: Vec<ConfigOption>,
}

impl OutboundAction {
    /// Creates an action with no arguments.
    pub fn new(service: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            action: action.into(),
            arguments: Vec::new(),
        }
    }

    /// Builder-style append of an argument.
    pub fn with_argument(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.arguments.push(ConfigOption::new(name, value));
        self
    }

    /// Value of the named argument.
    pub fn argument(&self, name: &str) -> Option<&serde_json::Value> {
        self.arguments.iter().find(|a| a.name == name).map(|a| &a.value)
    }
}

/// A fire-and-forget message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Unique per send.
    pub id: String,
    /// Message type, e.g. `action` or `client-ready`.
    #[serde(rename = "type")]
    pub msg_type: String,
    /// Protocol label.
    pub label: String,
    /// Message body, sent as `data` on the wire.
    #[serde(rename = "data", default)]
    pub payload: serde_json::Value,
}

impl OutboundMessage {
    /// Creates a message with a fresh random id and the default label.
    pub fn new(msg_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), msg_type, payload)
    }

    /// Creates a message with an explicit id.
    pub fn with_id(id: impl Into<String>, msg_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            msg_type: msg_type.into(),
            label: PROTOCOL_LABEL.to_string(),
            payload,
        }
    }

    /// Wrap an action into the message that carries it.
    pub fn from_action(id: impl Into<String>, action: &OutboundAction) -> Result<Self, serde_json::Error> {
        Ok(Self::with_id(id, ACTION_MESSAGE_TYPE, serde_json::to_value(action)?))
    }
}
