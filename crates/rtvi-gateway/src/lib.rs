//! Provisioning proxy for RTVI bots.
//!
//! Browsers and CLI sessions cannot hold the bot backend's credentials, so
//! they post their `{services, config}` here. The proxy validates the
//! request, adds the bot profile, duration limit and API keys, and forwards
//! it to the backend.
//!
//! # Main types
//!
//! - [`ProxyServer`]: Builds the axum router and serves it.
//! - [`ProxyConfig`]: Backend address, secrets and bot settings.
//! - [`BotStartPayload`]: What is forwarded to the backend.

/// Proxy settings.
pub mod config;
/// Payload construction and forwarding.
pub mod forward;
/// HTTP routes.
pub mod server;

pub use config::{ProxyConfig, ENV_API_KEY, ENV_BOTS_URL, ENV_OPENAI_API_KEY};
pub use forward::{BackendResponse, BotForwarder, BotStartPayload, StartRequest};
pub use server::{ProxyServer, ProxyState};
