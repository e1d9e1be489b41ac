//! Transport layer for RTVI sessions.
//!
//! A session treats its connection as opaque: it asks a [`Provisioner`] to
//! start a bot, hands the response to a [`Transport`], and consumes the
//! resulting stream of [`TransportEvent`]s through the [`codec`].
//!
//! # Main types
//!
//! - [`Transport`]: Trait for connecting, sending and disconnecting.
//! - [`WebSocketTransport`]: JSON frames over a WebSocket.
//! - [`MemoryTransport`]: In-process transport, also a recording spy.
//! - [`HttpProvisioner`]: Starts a bot through the provisioning proxy.

/// Wire codec and event-name translation.
pub mod codec;
/// In-memory transport.
pub mod memory;
/// Bot provisioning.
pub mod provision;
/// Core transport trait and event types.
pub mod transport;
/// WebSocket transport.
pub mod websocket;

pub use codec::{decode, encode, InboundFrame};
pub use memory::MemoryTransport;
pub use provision::{HttpProvisioner, ProvisionRequest, Provisioner, StaticProvisioner};
pub use transport::{ConnectParams, Transport, TransportEvent};
pub use websocket::WebSocketTransport;
