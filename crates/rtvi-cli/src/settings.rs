//! `rtvi.toml` loading.

use anyhow::Context;
use rtvi_gateway::ProxyConfig;
use rtvi_session::SessionOptions;
use serde::Deserialize;
use std::path::Path;
use tracing::info;

/// The whole configuration file. Both sections are optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RtviConfig {
    /// Client session defaults.
    #[serde(default)]
    pub session: SessionOptions,
    /// Provisioning proxy settings.
    #[serde(default)]
    pub proxy: ProxyConfig,
}

impl RtviConfig {
    /// Read `path`, falling back to defaults when the file does not exist.
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let text = match tokio::fs::read_to_string(path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read config file '{}'", path.display()))
            }
        };
        Self::parse(&text).with_context(|| format!("Invalid config file '{}'", path.display()))
    }

    /// Parse TOML text.
    pub fn parse(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }
}
