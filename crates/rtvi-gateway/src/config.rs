use serde::{Deserialize, Serialize};

/// Environment variable holding the bot backend's start endpoint.
pub const ENV_BOTS_URL: &str = "DAILY_BOTS_URL";
/// Environment variable holding the bot backend's API key.
pub const ENV_API_KEY: &str = "DAILY_API_KEY";
/// Environment variable holding the LLM provider key passed through to the bot.
pub const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";

/// Proxy settings, the `[proxy]` table of `rtvi.toml`.
///
/// Secrets are never serialized back out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Address the proxy listens on.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Bot backend start endpoint. Requests are rejected while unset.
    #[serde(default)]
    pub bots_url: Option<String>,
    /// Bearer token for the bot backend.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    /// OpenAI key forwarded to the bot under `api_keys.openai`.
    #[serde(default, skip_serializing)]
    pub openai_api_key: Option<String>,
    /// Bot profile requested from the backend.
    #[serde(default = "default_bot_profile")]
    pub bot_profile: String,
    /// Maximum session length in seconds.
    #[serde(default = "default_max_duration")]
    pub max_duration: u64,
    /// Server-side system prompt. When set it is merged into every
    /// forwarded config; when unset the client's config is forwarded as is.
    #[serde(default)]
    pub system_prompt: Option<String>,
}

fn default_bind() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_bot_profile() -> String {
    "voice_2024_10".to_string()
}

fn default_max_duration() -> u64 {
    600
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            bots_url: None,
            api_key: None,
            openai_api_key: None,
            bot_profile: default_bot_profile(),
            max_duration: default_max_duration(),
            system_prompt: None,
        }
    }
}

impl ProxyConfig {
    /// Fill in backend address and secrets from the process environment.
    /// Values already present are kept.
    pub fn with_env(self) -> Self {
        self.with_vars(|key| std::env::var(key).ok())
    }

    /// Like [`with_env`](Self::with_env) with an explicit lookup.
    pub fn with_vars(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if self.bots_url.is_none() {
            self.bots_url = non_empty(ENV_BOTS_URL);
        }
        if self.api_key.is_none() {
            self.api_key = non_empty(ENV_API_KEY);
        }
        if self.openai_api_key.is_none() {
            self.openai_api_key = non_empty(ENV_OPENAI_API_KEY);
        }
        self
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = ProxyConfig::default();
        assert_eq!(config.bind, "127.0.0.1:3000");
        assert_eq!(config.max_duration, 600);
        assert!(config.bots_url.is_none());
        assert!(config.system_prompt.is_none());
    }

    #[test]
    fn test_env_fills_missing_values_only() {
        let vars: HashMap<&str, &str> = [
            (ENV_BOTS_URL, "https://api.daily.co/v1/bots/start"),
            (ENV_API_KEY, "daily-secret"),
            (ENV_OPENAI_API_KEY, ""),
        ]
        .into_iter()
        .collect();
        let config = ProxyConfig {
            api_key: Some("from-file".into()),
            ..ProxyConfig::default()
        }
        .with_vars(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.bots_url.as_deref(), Some("https://api.daily.co/v1/bots/start"));
        assert_eq!(config.api_key.as_deref(), Some("from-file"));
        assert!(config.openai_api_key.is_none());
    }

    #[test]
    fn test_secrets_not_serialized() {
        let config = ProxyConfig {
            api_key: Some("daily-secret".into()),
            openai_api_key: Some("sk-secret".into()),
            ..ProxyConfig::default()
        };
        let out = serde_json::to_string(&config).unwrap();
        assert!(!out.contains("secret"));
    }

    #[test]
    fn test_from_toml() {
        let config: ProxyConfig = toml::from_str(
            r#"
            bind = "0.0.0.0:8080"
            bots_url = "http://bots/start"
            max_duration = 300
            system_prompt = "You are a storyteller."
            "#,
        )
        .unwrap();
        assert_eq!(config.bind, "0.0.0.0:8080");
        assert_eq!(config.max_duration, 300);
        assert_eq!(config.bot_profile, "voice_2024_10");
        assert_eq!(config.system_prompt.as_deref(), Some("You are a storyteller."));
    }
}
