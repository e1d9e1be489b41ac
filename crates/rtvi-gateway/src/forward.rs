use crate::config::ProxyConfig;
use rtvi_core::{RtviError, RtviResult, ServiceConfig, ServiceConfigBuilder, Services};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{info, warn};

const REDACTED: &str = "[REDACTED]";

/// Body a client posts to `/api`. Both fields are optional on the wire so
/// that their absence is reported as a configuration error, not a parse error.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StartRequest {
    /// Provider per service.
    #[serde(default)]
    pub services: Option<Services>,
    /// Per-service options.
    #[serde(default)]
    pub config: Option<ServiceConfig>,
}

/// Payload sent to the bot backend.
#[derive(Debug, Clone, Serialize)]
pub struct BotStartPayload {
    /// Bot profile.
    pub bot_profile: String,
    /// Maximum session length in seconds.
    pub max_duration: u64,
    /// Provider per service.
    pub services: Services,
    /// Provider keys, by provider name.
    pub api_keys: BTreeMap<String, String>,
    /// Final service configuration.
    pub config: ServiceConfig,
}

impl BotStartPayload {
    /// Validate a client request and build the backend payload.
    pub fn from_request(config: &ProxyConfig, request: &StartRequest) -> RtviResult<Self> {
        let builder = ServiceConfigBuilder::new(config.bots_url.as_deref());
        let (services, user_config) = (request.services.as_ref(), request.config.as_ref());
        builder.validate(services, user_config)?;

        let merged = match &config.system_prompt {
            Some(prompt) => builder.build(services, user_config, prompt)?,
            None => user_config.cloned().unwrap_or_default(),
        };

        let mut api_keys = BTreeMap::new();
        if let Some(key) = &config.openai_api_key {
            api_keys.insert("openai".to_string(), key.clone());
        }

        Ok(Self {
            bot_profile: config.bot_profile.clone(),
            max_duration: config.max_duration,
            services: services.cloned().unwrap_or_default(),
            api_keys,
            config: merged,
        })
    }

    /// The payload as JSON with every API key replaced, for logging.
    pub fn redacted(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or(Value::Null);
        if let Some(Value::Object(keys)) = value.get_mut("api_keys") {
            for v in keys.values_mut() {
                *v = Value::String(REDACTED.to_string());
            }
        }
        value
    }
}

/// The backend's answer: its status code and JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendResponse {
    /// HTTP status returned by the backend.
    pub status: u16,
    /// Parsed response body.
    pub body: Value,
}

/// Sends start requests to the bot backend.
#[derive(Clone)]
pub struct BotForwarder {
    client: reqwest::Client,
}

impl BotForwarder {
    /// Creates a forwarder with a fresh HTTP client.
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// POST `payload` to `url`. Any status is returned to the caller; only
    /// network failures and non-JSON bodies are errors.
    pub async fn forward(
        &self,
        url: &str,
        api_key: Option<&str>,
        payload: &BotStartPayload,
    ) -> RtviResult<BackendResponse> {
        info!(url = %url, payload = %payload.redacted(), "Forwarding bot start request");

        let mut request = self.client.post(url).json(payload);
        match api_key {
            Some(key) => request = request.bearer_auth(key),
            None => warn!("No bot backend API key configured, sending unauthenticated request"),
        }

        let resp = request
            .send()
            .await
            .map_err(|e| RtviError::Http(format!("bot backend unreachable: {e}")))?;
        let status = resp.status().as_u16();
        let text = resp
            .text()
            .await
            .map_err(|e| RtviError::Http(format!("failed to read bot backend response: {e}")))?;
        let body: Value = serde_json::from_str(&text).map_err(|e| {
            RtviError::Http(format!("bot backend returned non-JSON body (status {status}): {e}"))
        })?;

        info!(status, body = %body, "Bot backend responded");
        Ok(BackendResponse { status, body })
    }
}

impl Default for BotForwarder {
    fn default() -> Self {
        Self::new()
    }
}
