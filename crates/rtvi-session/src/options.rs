use rtvi_core::{ServiceConfig, ServiceOption, Services};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default readiness timeout.
pub const DEFAULT_BOT_READY_TIMEOUT_MS: u64 = 15_000;

/// Default system prompt for a storytelling bot.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a creative storyteller who loves to tell \
whimsical, fantastical stories. Your goal is to craft an engaging and fun story. Start by \
asking the user what kind of story they'd like to hear. Keep each part of the story short \
and end it by asking the user how the story should continue.";

/// Parameters a [`Session`](crate::Session) is constructed from.
///
/// Plain data, so it can live in the `[session]` table of `rtvi.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionOptions {
    /// Provisioning endpoint, usually the proxy's `/api` route.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Provider per service.
    #[serde(default = "default_services")]
    pub services: Services,
    /// Per-service options.
    #[serde(default = "default_config")]
    pub config: ServiceConfig,
    /// How long `connect` waits for the bot to signal readiness.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// System prompt merged into the LLM's initial messages.
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

/// The proxy's `/api` route on its default bind address.
pub fn default_base_url() -> String {
    "http://127.0.0.1:3000/api".to_string()
}

fn default_timeout_ms() -> u64 {
    DEFAULT_BOT_READY_TIMEOUT_MS
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

/// Default provider selection: OpenAI for the LLM, Cartesia for speech.
pub fn default_services() -> Services {
    let mut services = Services::new();
    services.insert("llm".into(), "openai".into());
    services.insert("tts".into(), "cartesia".into());
    services
}

/// Default per-service options matching [`default_services`].
pub fn default_config() -> ServiceConfig {
    ServiceConfig::from_entries(vec![
        ServiceOption::new("tts").with_option("voice", "79a125e8-cd45-4c13-8a67-188112f4dd22"),
        ServiceOption::new("llm").with_option("model", "gpt-4o-mini"),
    ])
    .unwrap_or_default()
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::new(default_base_url())
    }
}

impl SessionOptions {
    /// Options with defaults for everything except the endpoint.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            services: default_services(),
            config: default_config(),
            timeout_ms: default_timeout_ms(),
            system_prompt: default_system_prompt(),
        }
    }

    /// Replace the service selection.
    pub fn with_services(mut self, services: Services) -> Self {
        self.services = services;
        self
    }

    /// Replace the service configuration.
    pub fn with_config(mut self, config: ServiceConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the readiness timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the system prompt.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// The readiness timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
