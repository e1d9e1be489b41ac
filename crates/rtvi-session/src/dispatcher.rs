use crate::session::SessionCore;
use rtvi_core::{OutboundAction, OutboundMessage, RtviError, RtviResult};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::debug;

/// Sends outbound traffic for a session.
///
/// Both operations require the session to be `Ready` and fail with
/// [`RtviError::InvalidState`] before touching the transport otherwise.
/// Cloning is cheap; clones share the session and the call-id counter.
#[derive(Clone)]
pub struct Dispatcher {
    core: Arc<SessionCore>,
    next_call_id: Arc<AtomicU64>,
}

impl Dispatcher {
    pub(crate) fn new(core: Arc<SessionCore>) -> Self {
        Self {
            core,
            next_call_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Fire-and-forget. `Ok` means the transport accepted the message.
    pub async fn send(&self, message: OutboundMessage) -> RtviResult<()> {
        self.core.ensure_ready("send")?;
        self.core.transport.send(&message).await?;
        debug!(
            session_id = %self.core.id,
            id = %message.id,
            msg_type = %message.msg_type,
            "Message sent"
        );
        Ok(())
    }

    /// Request/response. Resolves with the backend's response payload, or
    /// [`RtviError::Backend`] when that payload carries an `error` field.
    pub async fn call(&self, action: OutboundAction) -> RtviResult<Value> {
        self.core.ensure_ready("call")?;

        let id = format!("call-{}", self.next_call_id.fetch_add(1, Ordering::SeqCst));
        let message = OutboundMessage::from_action(id.clone(), &action)?;

        let (tx, rx) = oneshot::channel();
        self.core.pending.lock().insert(id.clone(), tx);

        if let Err(e) = self.core.transport.send(&message).await {
            self.core.pending.lock().remove(&id);
            return Err(e);
        }
        debug!(
            session_id = %self.core.id,
            id = %id,
            service = %action.service,
            action = %action.action,
            "Action sent"
        );

        rx.await.map_err(|_| RtviError::Cancelled)?
    }

    /// Number of calls awaiting a response.
    pub fn pending_calls(&self) -> usize {
        self.core.pending.lock().len()
    }
}

/// Turn a correlated response payload into the call's result.
pub(crate) fn call_result(payload: Value) -> RtviResult<Value> {
    match payload.get("error") {
        Some(err) if !err.is_null() => Err(RtviError::Backend {
            detail: err
                .as_str()
                .map(str::to_owned)
                .unwrap_or_else(|| err.to_string()),
        }),
        _ => Ok(payload),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_call_result_passthrough() {
        let payload = json!({"result": {"messages": []}, "extra": 1});
        assert_eq!(call_result(payload.clone()).unwrap(), payload);
    }

    #[test]
    fn test_call_result_error_string() {
        let err = call_result(json!({"error": "unknown action"})).unwrap_err();
        assert!(matches!(err, RtviError::Backend { ref detail } if detail == "unknown action"));
    }

    #[test]
    fn test_call_result_error_object() {
        let err = call_result(json!({"error": {"code": 7}})).unwrap_err();
        assert!(matches!(err, RtviError::Backend { ref detail } if detail.contains("\"code\":7")));
    }

    #[test]
    fn test_call_result_null_error_is_success() {
        assert!(call_result(json!({"error": null, "result": true})).is_ok());
    }
}
