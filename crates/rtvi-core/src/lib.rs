//! Core types and error definitions for RTVI voice bot sessions.
//!
//! This crate provides the foundational types shared across all RTVI crates,
//! including error handling, the declarative service configuration, and the
//! inbound/outbound protocol model.
//!
//! # Main types
//!
//! - [`RtviError`]: Unified error enum for all RTVI subsystems.
//! - [`RtviResult`]: Convenience alias for `Result<T, RtviError>`.
//! - [`SessionState`]: Lifecycle state of a session.
//! - [`ServiceConfig`] / [`ServiceConfigBuilder`]: Per-service options and the
//!   system-prompt merge applied before a session starts.
//! - [`InboundEvent`]: The four event kinds a backend can deliver.
//! - [`OutboundAction`] / [`OutboundMessage`]: Client-to-backend calls and sends.

/// Service configuration and the config builder.
pub mod config;
/// Error taxonomy.
pub mod error;
/// LLM conversation messages.
pub mod message;
/// Protocol event and message types.
pub mod protocol;
/// Session lifecycle states.
pub mod state;

pub use config::{
    ConfigOption, ServiceConfig, ServiceConfigBuilder, ServiceOption, Services, INITIAL_MESSAGES,
    LLM_SERVICE,
};
pub use error::{RtviError, RtviResult};
pub use message::{LlmMessage, Role};
pub use protocol::{
    EventKind, InboundEvent, OutboundAction, OutboundMessage, ACTION_MESSAGE_TYPE, PROTOCOL_LABEL,
};
pub use state::SessionState;
