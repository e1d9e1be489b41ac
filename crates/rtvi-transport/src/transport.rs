use async_trait::async_trait;
use rtvi_core::{OutboundMessage, RtviResult};
use tokio::sync::mpsc;

/// Something that happened on the connection.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A frame from the backend, not yet decoded.
    Frame(serde_json::Value),
    /// The remote end closed the connection.
    Closed(Option<String>),
    /// The connection failed.
    Failed(String),
}

/// Where to connect, as returned by the provisioning call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectParams {
    /// Connection URL (`url`, `room_url` or `ws_url` in the provisioning response).
    pub url: Option<String>,
    /// Access token for the connection, if the backend issued one.
    pub token: Option<String>,
    /// The full provisioning response.
    pub raw: serde_json::Value,
}

impl ConnectParams {
    /// Extract connection details from a provisioning response.
    pub fn from_provision(raw: serde_json::Value) -> Self {
        let url = ["url", "room_url", "ws_url"]
            .iter()
            .find_map(|key| raw.get(*key).and_then(serde_json::Value::as_str))
            .map(str::to_owned);
        let token = raw
            .get("token")
            .and_then(serde_json::Value::as_str)
            .map(str::to_owned);
        Self { url, token, raw }
    }
}

/// The opaque connection a session drives.
///
/// A transport is connected at most once. Inbound traffic is handed back as a
/// stream of [`TransportEvent`]s in the order the backend emitted it; the
/// stream ends when the transport is disconnected.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Open the connection.
    async fn connect(
        &self,
        params: &ConnectParams,
    ) -> RtviResult<mpsc::UnboundedReceiver<TransportEvent>>;

    /// Hand a message to the connection. Success means accepted, not delivered.
    async fn send(&self, message: &OutboundMessage) -> RtviResult<()>;

    /// Release the connection. Calling it on a closed transport is a no-op.
    async fn disconnect(&self) -> RtviResult<()>;
}
