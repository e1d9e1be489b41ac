use crate::transport::{ConnectParams, Transport, TransportEvent};
use async_trait::async_trait;
use parking_lot::Mutex;
use rtvi_core::{OutboundMessage, RtviError, RtviResult};
use std::sync::Arc;
use tokio::sync::mpsc;

type Responder = Box<dyn Fn(&OutboundMessage) -> Option<serde_json::Value> + Send + Sync>;

/// In-process transport.
///
/// Clones share the same connection, so one clone can be handed to a session
/// while another plays the backend: pushing frames, inspecting what was sent,
/// and counting every call the session made.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    inner: Arc<Mutex<MemoryInner>>,
}

#[derive(Default)]
struct MemoryInner {
    inbound: Option<mpsc::UnboundedSender<TransportEvent>>,
    queued: Vec<TransportEvent>,
    sent: Vec<OutboundMessage>,
    connects: usize,
    disconnects: usize,
    fail_connect: Option<String>,
    responder: Option<Responder>,
}

impl MemoryTransport {
    /// Creates a disconnected transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver an event to the session. Events pushed before `connect` are
    /// queued and delivered, in order, as soon as the session connects.
    pub fn push(&self, event: TransportEvent) {
        let mut inner = self.inner.lock();
        match &inner.inbound {
            Some(tx) => {
                let _ = tx.send(event);
            }
            None => inner.queued.push(event),
        }
    }

    /// Deliver a raw backend frame.
    pub fn push_frame(&self, frame: serde_json::Value) {
        self.push(TransportEvent::Frame(frame));
    }

    /// Make the next `connect` fail with a transport error.
    pub fn fail_next_connect(&self, detail: impl Into<String>) {
        self.inner.lock().fail_connect = Some(detail.into());
    }

    /// Answer outbound messages automatically: whenever the responder returns
    /// a frame for a sent message, that frame is pushed back as inbound.
    pub fn set_responder<F>(&self, responder: F)
    where
        F: Fn(&OutboundMessage) -> Option<serde_json::Value> + Send + Sync + 'static,
    {
        self.inner.lock().responder = Some(Box::new(responder));
    }

    /// Messages accepted so far, in send order.
    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.inner.lock().sent.clone()
    }

    /// Number of messages accepted.
    pub fn send_count(&self) -> usize {
        self.inner.lock().sent.len()
    }

    /// Number of `connect` calls, failed ones included.
    pub fn connect_count(&self) -> usize {
        self.inner.lock().connects
    }

    /// Number of `disconnect` calls.
    pub fn disconnect_count(&self) -> usize {
        self.inner.lock().disconnects
    }

    /// Whether a connection is currently open.
    pub fn is_connected(&self) -> bool {
        self.inner.lock().inbound.is_some()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn name(&self) -> &str {
        "memory"
    }

    async fn connect(
        &self,
        _params: &ConnectParams,
    ) -> RtviResult<mpsc::UnboundedReceiver<TransportEvent>> {
        let mut inner = self.inner.lock();
        inner.connects += 1;
        if let Some(detail) = inner.fail_connect.take() {
            return Err(RtviError::Transport(detail));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        for event in inner.queued.drain(..) {
            let _ = tx.send(event);
        }
        inner.inbound = Some(tx);
        Ok(rx)
    }

    async fn send(&self, message: &OutboundMessage) -> RtviResult<()> {
        let mut inner = self.inner.lock();
        let Some(tx) = inner.inbound.clone() else {
            return Err(RtviError::Transport("memory transport is not connected".into()));
        };
        inner.sent.push(message.clone());
        if let Some(reply) = inner.responder.as_ref().and_then(|r| r(message)) {
            let _ = tx.send(TransportEvent::Frame(reply));
        }
        Ok(())
    }

    async fn disconnect(&self) -> RtviResult<()> {
        let mut inner = self.inner.lock();
        inner.disconnects += 1;
        inner.inbound = None;
        Ok(())
    }
}
