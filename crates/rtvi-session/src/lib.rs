//! Session lifecycle for RTVI voice bots.
//!
//! A [`Session`] owns one conversation with a remote bot: it builds the
//! service configuration, provisions the bot, waits for readiness and then
//! routes inbound events to subscribers and helpers while the
//! [`Dispatcher`] carries outbound traffic.
//!
//! # Main types
//!
//! - [`Session`]: The state machine and entry point.
//! - [`EventBus`]: Ordered fan-out of inbound events.
//! - [`HelperRegistry`] / [`Helper`]: Per-service message handlers.
//! - [`LlmHelper`]: Helper for the `llm` service.
//! - [`Dispatcher`]: `send` and `call` gated on readiness.
//! - [`SessionOptions`]: Construction parameters.

/// Inbound event fan-out.
pub mod bus;
/// Outbound send and call.
pub mod dispatcher;
/// Helper trait and registry.
pub mod helper;
/// The `llm` service helper.
pub mod llm;
/// Session construction parameters.
pub mod options;
/// The session state machine.
pub mod session;

pub use bus::{EventBus, EventCallback, SubscriptionHandle};
pub use dispatcher::Dispatcher;
pub use helper::{Helper, HelperRegistry};
pub use llm::{FunctionCall, LlmHelper};
pub use options::{SessionOptions, DEFAULT_BOT_READY_TIMEOUT_MS, DEFAULT_SYSTEM_PROMPT};
pub use session::{FailureKind, Session, SessionFailure, StateChange};
