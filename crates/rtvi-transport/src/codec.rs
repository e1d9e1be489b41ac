//! Wire codec: backend frames in, [`InboundFrame`]s out.
//!
//! Backends have shipped the same signal under several names
//! (`bot-ready`/`botReady`, `transcript`/`user-transcription`, ...). All of
//! them collapse here into the four [`InboundEvent`] variants plus call
//! responses. Anything unrecognised is a [`RtviError::Protocol`].

use rtvi_core::{InboundEvent, OutboundMessage, RtviError, RtviResult, LLM_SERVICE};
use serde::Deserialize;
use serde_json::Value;

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// An event for the event bus.
    Event(InboundEvent),
    /// The response to an outbound call, correlated by `id`.
    ActionResponse {
        /// Id of the originating call.
        id: String,
        /// Response data. Carries an `error` field when the call failed.
        payload: Value,
    },
}

#[derive(Debug, Deserialize)]
struct WireFrame {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    label: Option<String>,
    #[serde(rename = "type")]
    msg_type: String,
    #[serde(default)]
    data: Value,
}

/// Decode one backend frame.
pub fn decode(frame: Value) -> RtviResult<InboundFrame> {
    let wire: WireFrame = serde_json::from_value(frame)
        .map_err(|e| RtviError::Protocol(format!("unrecognised frame: {e}")))?;

    let event = match wire.msg_type.as_str() {
        "bot-ready" | "botReady" | "ready" => InboundEvent::Ready,

        "transcript" | "user-transcription" | "bot-transcription" | "botTranscript" => {
            InboundEvent::Transcript {
                text: required_str(&wire.data, "text", &wire.msg_type)?,
                is_final: wire.data.get("final").and_then(Value::as_bool).unwrap_or(true),
            }
        }

        "generic-message" | "genericMessage" | "server-message" => {
            let service_label = wire
                .data
                .get("service")
                .and_then(Value::as_str)
                .map(str::to_owned)
                .or(wire.label)
                .ok_or_else(|| {
                    RtviError::Protocol(format!("'{}' frame has no service label", wire.msg_type))
                })?;
            InboundEvent::GenericMessage {
                service_label,
                payload: wire.data,
            }
        }

        "llm-json-completion" | "llmJsonCompletion" | "llm-function-call" | "bot-llm-text" => {
            InboundEvent::GenericMessage {
                service_label: LLM_SERVICE.to_string(),
                payload: wire.data,
            }
        }

        "error" | "bot-error" => InboundEvent::Error {
            detail: error_detail(&wire.data).ok_or_else(|| {
                RtviError::Protocol(format!("'{}' frame has no error detail", wire.msg_type))
            })?,
        },

        "action-response" | "error-response" => {
            let id = match wire.id {
                Some(Value::String(s)) => s,
                Some(Value::Number(n)) => n.to_string(),
                _ => {
                    return Err(RtviError::Protocol(format!(
                        "'{}' frame has no id",
                        wire.msg_type
                    )))
                }
            };
            let payload = if wire.msg_type == "error-response" && wire.data.get("error").is_none() {
                let detail = error_detail(&wire.data).unwrap_or_else(|| wire.data.to_string());
                serde_json::json!({ "error": detail })
            } else {
                wire.data
            };
            return Ok(InboundFrame::ActionResponse { id, payload });
        }

        other => {
            return Err(RtviError::Protocol(format!("unknown message type '{other}'")));
        }
    };

    Ok(InboundFrame::Event(event))
}

/// Serialize an outbound message for a text transport.
pub fn encode(message: &OutboundMessage) -> RtviResult<String> {
    Ok(serde_json::to_string(message)?)
}

fn required_str(data: &Value, field: &str, msg_type: &str) -> RtviResult<String> {
    data.get(field)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| RtviError::Protocol(format!("'{msg_type}' frame is missing '{field}'")))
}

fn error_detail(data: &Value) -> Option<String> {
    if let Some(s) = data.as_str() {
        return Some(s.to_owned());
    }
    ["error", "message"]
        .iter()
        .find_map(|key| data.get(*key).and_then(Value::as_str))
        .map(str::to_owned)
}
