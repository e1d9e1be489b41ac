use crate::codec;
use crate::transport::{ConnectParams, Transport, TransportEvent};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use rtvi_core::{OutboundMessage, RtviError, RtviResult};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, warn};

/// Transport over a WebSocket carrying JSON text frames.
///
/// The connection URL comes from the provisioning response. When the backend
/// also issued a token it is appended as a `token` query parameter.
pub struct WebSocketTransport {
    outbound: Mutex<Option<mpsc::UnboundedSender<WsMessage>>>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl WebSocketTransport {
    /// Creates an unconnected transport.
    pub fn new() -> Self {
        Self {
            outbound: Mutex::new(None),
            reader: Mutex::new(None),
        }
    }

    fn connection_url(params: &ConnectParams) -> RtviResult<String> {
        let url = params.url.as_deref().ok_or_else(|| {
            RtviError::Transport("provisioning response carries no connection url".into())
        })?;
        Ok(match &params.token {
            Some(token) => {
                let sep = if url.contains('?') { '&' } else { '?' };
                format!("{url}{sep}token={token}")
            }
            None => url.to_string(),
        })
    }
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    fn name(&self) -> &str {
        "websocket"
    }

    async fn connect(
        &self,
        params: &ConnectParams,
    ) -> RtviResult<mpsc::UnboundedReceiver<TransportEvent>> {
        if self.outbound.lock().is_some() {
            return Err(RtviError::Transport("websocket is already connected".into()));
        }
        let url = Self::connection_url(params)?;
        let (ws, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| RtviError::Transport(format!("WebSocket connect failed: {e}")))?;
        info!(url = %params.url.as_deref().unwrap_or_default(), "WebSocket connected");

        let (mut sink, mut stream) = ws.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<WsMessage>();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        // Task: forward queued outbound messages to the socket
        tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                let closing = matches!(msg, WsMessage::Close(_));
                if let Err(e) = sink.send(msg).await {
                    warn!(error = %e, "WebSocket write failed");
                    break;
                }
                if closing {
                    break;
                }
            }
        });

        // Task: read frames and hand them to the session
        let reader = tokio::spawn(async move {
            while let Some(next) = stream.next().await {
                let event = match next {
                    Ok(WsMessage::Text(text)) => {
                        let frame = serde_json::from_str(&text)
                            .unwrap_or(serde_json::Value::String(text));
                        TransportEvent::Frame(frame)
                    }
                    Ok(WsMessage::Close(frame)) => {
                        let reason = frame.map(|f| f.reason.to_string());
                        let _ = event_tx.send(TransportEvent::Closed(reason));
                        return;
                    }
                    Ok(WsMessage::Binary(bytes)) => {
                        debug!(len = bytes.len(), "Ignoring binary WebSocket frame");
                        continue;
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        error!(error = %e, "WebSocket read failed");
                        let _ = event_tx.send(TransportEvent::Failed(e.to_string()));
                        return;
                    }
                };
                if event_tx.send(event).is_err() {
                    return;
                }
            }
            let _ = event_tx.send(TransportEvent::Closed(None));
        });

        *self.outbound.lock() = Some(out_tx);
        *self.reader.lock() = Some(reader);
        Ok(event_rx)
    }

    async fn send(&self, message: &OutboundMessage) -> RtviResult<()> {
        let text = codec::encode(message)?;
        let guard = self.outbound.lock();
        let tx = guard
            .as_ref()
            .ok_or_else(|| RtviError::Transport("websocket is not connected".into()))?;
        tx.send(WsMessage::Text(text))
            .map_err(|_| RtviError::Transport("websocket connection closed".into()))?;
        debug!(id = %message.id, msg_type = %message.msg_type, "Frame queued");
        Ok(())
    }

    async fn disconnect(&self) -> RtviResult<()> {
        let Some(tx) = self.outbound.lock().take() else {
            return Ok(());
        };
        let _ = tx.send(WsMessage::Close(None));
        // The writer exits after flushing the close frame.
        if let Some(reader) = self.reader.lock().take() {
            reader.abort();
        }
        info!("WebSocket disconnected");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_url_with_token() {
        let params = ConnectParams {
            url: Some("wss://bots.example.com/ws".into()),
            token: Some("abc".into()),
            raw: json!({}),
        };
        assert_eq!(
            WebSocketTransport::connection_url(&params).unwrap(),
            "wss://bots.example.com/ws?token=abc"
        );

        let params = ConnectParams {
            url: Some("wss://bots.example.com/ws?room=1".into()),
            token: Some("abc".into()),
            raw: json!({}),
        };
        assert!(WebSocketTransport::connection_url(&params)
            .unwrap()
            .ends_with("?room=1&token=abc"));
    }

    #[test]
    fn test_missing_url_is_transport_error() {
        let err = WebSocketTransport::connection_url(&ConnectParams::default()).unwrap_err();
        assert!(matches!(err, RtviError::Transport(_)));
    }

    #[tokio::test]
    async fn test_send_before_connect_fails() {
        let transport = WebSocketTransport::new();
        let msg = OutboundMessage::new("ping", json!({}));
        assert!(transport.send(&msg).await.is_err());
    }

    #[tokio::test]
    async fn test_disconnect_when_idle_is_noop() {
        let transport = WebSocketTransport::new();
        transport.disconnect().await.unwrap();
        transport.disconnect().await.unwrap();
    }
}
