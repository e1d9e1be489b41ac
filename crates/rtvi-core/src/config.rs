//! Declarative service configuration sent to the bot backend at session start.

use crate::error::{RtviError, RtviResult};
use crate::message::LlmMessage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Service name of the language-model service.
pub const LLM_SERVICE: &str = "llm";

/// Option of the `llm` service that seeds the conversation.
pub const INITIAL_MESSAGES: &str = "initial_messages";

/// Which provider backs each named service, e.g. `llm -> openai`.
pub type Services = BTreeMap<String, String>;

/// A single named option of a service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigOption {
    /// Option name, unique within its service entry by convention.
    pub name: String,
    /// Arbitrary structured value.
    pub value: serde_json::Value,
}

impl ConfigOption {
    /// Creates a new option.
    pub fn new(name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// The ordered options of one service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceOption {
    /// Service name (`llm`, `tts`, `stt`, `vad`, ...).
    pub service: String,
    /// Options in the order they were declared.
    #[serde(default)]
    pub options: Vec<ConfigOption>,
}

impl ServiceOption {
    /// Creates an entry with no options.
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            options: Vec::new(),
        }
    }

    /// Builder-style append of an option.
    pub fn with_option(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.options.push(ConfigOption::new(name, value));
        self
    }

    /// First option with the given name.
    pub fn option(&self, name: &str) -> Option<&ConfigOption> {
        self.options.iter().find(|o| o.name == name)
    }

    /// Replace the value of `name` in place, or append it if absent.
    pub fn set_option(&mut self, name: &str, value: impl Into<serde_json::Value>) {
        let value = value.into();
        match self.options.iter_mut().find(|o| o.name == name) {
            Some(existing) => existing.value = value,
            None => self.options.push(ConfigOption::new(name, value)),
        }
    }
}

/// Ordered set of [`ServiceOption`]s, serialized as a JSON array.
///
/// Service names are unique within a config; [`ServiceConfig::push`]
/// enforces it and [`ServiceConfigBuilder`] re-checks deserialized input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceConfig {
    entries: Vec<ServiceOption>,
}

impl ServiceConfig {
    /// Creates an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a config from entries, rejecting duplicate service names.
    pub fn from_entries(entries: Vec<ServiceOption>) -> RtviResult<Self> {
        let mut config = Self::new();
        for entry in entries {
            config.push(entry)?;
        }
        Ok(config)
    }

    /// Appends an entry. Fails if the service is already configured.
    pub fn push(&mut self, entry: ServiceOption) -> RtviResult<()> {
        if self.service(&entry.service).is_some() {
            return Err(RtviError::Configuration(format!(
                "service '{}' is configured more than once",
                entry.service
            )));
        }
        self.entries.push(entry);
        Ok(())
    }

    /// The entry for `service`, if present.
    pub fn service(&self, service: &str) -> Option<&ServiceOption> {
        self.entries.iter().find(|e| e.service == service)
    }

    /// Entries in order.
    pub fn iter(&self) -> std::slice::Iter<'_, ServiceOption> {
        self.entries.iter()
    }

    /// Number of service entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no service is configured.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn check_unique(&self) -> RtviResult<()> {
        for (i, entry) in self.entries.iter().enumerate() {
            if self.entries[..i].iter().any(|e| e.service == entry.service) {
                return Err(RtviError::Configuration(format!(
                    "service '{}' is configured more than once",
                    entry.service
                )));
            }
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a ServiceConfig {
    type Item = &'a ServiceOption;
    type IntoIter = std::slice::Iter<'a, ServiceOption>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Validates caller input and merges the system prompt into the `llm` entry.
///
/// The backend address is mandatory: a builder without one refuses to build,
/// mirroring a deployment where the bot backend URL was never configured.
#[derive(Debug, Clone, Default)]
pub struct ServiceConfigBuilder {
    backend_url: Option<String>,
}

impl ServiceConfigBuilder {
    /// Creates a builder bound to the backend address the config is destined for.
    pub fn new(backend_url: Option<&str>) -> Self {
        Self {
            backend_url: backend_url.map(str::to_owned),
        }
    }

    /// Check presence of every mandatory input without merging anything.
    pub fn validate(
        &self,
        services: Option<&Services>,
        config: Option<&ServiceConfig>,
    ) -> RtviResult<()> {
        match services {
            Some(s) if !s.is_empty() => {}
            _ => return Err(RtviError::Configuration("services are missing".into())),
        }
        let config = match config {
            Some(c) if !c.is_empty() => c,
            _ => return Err(RtviError::Configuration("config is missing".into())),
        };
        match self.backend_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => {}
            _ => {
                return Err(RtviError::Configuration(
                    "backend address is not configured".into(),
                ))
            }
        }
        config.check_unique()
    }

    /// Produce the config to send: caller entries in their original order,
    /// followed by the `llm` entry with the system prompt prepended to its
    /// `initial_messages`.
    pub fn build(
        &self,
        services: Option<&Services>,
        config: Option<&ServiceConfig>,
        system_prompt: &str,
    ) -> RtviResult<ServiceConfig> {
        self.validate(services, config)?;
        let mut entries = config.map(|c| c.entries.clone()).unwrap_or_default();

        let llm = match entries.iter().position(|e| e.service == LLM_SERVICE) {
            Some(idx) => entries.remove(idx),
            None => {
                debug!("No llm entry in config, adding one for the system prompt");
                ServiceOption::new(LLM_SERVICE)
            }
        };
        let system = serde_json::to_value(LlmMessage::system(system_prompt))?;
        entries.push(prepend_initial_message(llm, system)?);
        debug!(services = entries.len(), "Built service config");

        Ok(ServiceConfig { entries })
    }
}

fn prepend_initial_message(
    mut llm: ServiceOption,
    message: serde_json::Value,
) -> RtviResult<ServiceOption> {
    match llm.options.iter_mut().find(|o| o.name == INITIAL_MESSAGES) {
        Some(existing) => match existing.value.as_array_mut() {
            Some(messages) => messages.insert(0, message),
            None => {
                return Err(RtviError::Configuration(format!(
                    "'{LLM_SERVICE}.{INITIAL_MESSAGES}' must be a list"
                )))
            }
        },
        None => llm
            .options
            .push(ConfigOption::new(INITIAL_MESSAGES, vec![message])),
    }
    Ok(llm)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    const URL: &str = "https://bots.example.com/start";

    fn services() -> Services {
        let mut s = Services::new();
        s.insert("llm".into(), "openai".into());
        s.insert("tts".into(), "cartesia".into());
        s
    }

    fn tts_only() -> ServiceConfig {
        ServiceConfig::from_entries(vec![
            ServiceOption::new("tts").with_option("voice", "narrator"),
        ])
        .unwrap()
    }

    fn initial_messages(config: &ServiceConfig) -> serde_json::Value {
        config
            .service(LLM_SERVICE)
            .and_then(|e| e.option(INITIAL_MESSAGES))
            .map(|o| o.value.clone())
            .unwrap()
    }

    #[test]
    fn test_seeds_initial_messages_when_absent() {
        let builder = ServiceConfigBuilder::new(Some(URL));
        let out = builder
            .build(Some(&services()), Some(&tts_only()), "Tell a story.")
            .unwrap();

        assert_eq!(
            initial_messages(&out),
            json!([{"role": "system", "content": "Tell a story."}])
        );
    }

    #[test]
    fn test_prepends_to_existing_initial_messages() {
        let config = ServiceConfig::from_entries(vec![
            ServiceOption::new("llm")
                .with_option("model", "gpt-4o")
                .with_option(
                    INITIAL_MESSAGES,
                    json!([{"role": "user", "content": "hi"}, {"role": "assistant", "content": "hello"}]),
                )
                .with_option("run_on_config", true),
            ServiceOption::new("tts").with_option("voice", "narrator"),
        ])
        .unwrap();

        let out = ServiceConfigBuilder::new(Some(URL))
            .build(Some(&services()), Some(&config), "S")
            .unwrap();

        assert_eq!(
            initial_messages(&out),
            json!([
                {"role": "system", "content": "S"},
                {"role": "user", "content": "hi"},
                {"role": "assistant", "content": "hello"}
            ])
        );
        let llm = out.service(LLM_SERVICE).unwrap();
        assert_eq!(llm.options.len(), 3);
        assert_eq!(llm.options[0].name, "model");
        assert_eq!(llm.options[2].value, json!(true));
    }

    #[test]
    fn test_llm_entry_placed_last_others_keep_order() {
        let config = ServiceConfig::from_entries(vec![
            ServiceOption::new("vad").with_option("threshold", 0.5),
            ServiceOption::new("llm").with_option("model", "gpt-4o"),
            ServiceOption::new("tts").with_option("voice", "narrator"),
        ])
        .unwrap();

        let out = ServiceConfigBuilder::new(Some(URL))
            .build(Some(&services()), Some(&config), "S")
            .unwrap();

        let names: Vec<&str> = out.iter().map(|e| e.service.as_str()).collect();
        assert_eq!(names, vec!["vad", "tts", "llm"]);
        assert_eq!(out.iter().filter(|e| e.service == LLM_SERVICE).count(), 1);
    }

    #[test]
    fn test_missing_inputs_are_configuration_errors() {
        let builder = ServiceConfigBuilder::new(Some(URL));
        let empty_services = Services::new();

        for result in [
            builder.build(None, Some(&tts_only()), "S"),
            builder.build(Some(&empty_services), Some(&tts_only()), "S"),
            builder.build(Some(&services()), None, "S"),
            builder.build(Some(&services()), Some(&ServiceConfig::new()), "S"),
        ] {
            assert!(matches!(result, Err(RtviError::Configuration(_))));
        }
    }

    #[test]
    fn test_missing_backend_address() {
        for builder in [
            ServiceConfigBuilder::new(None),
            ServiceConfigBuilder::new(Some("  ")),
        ] {
            let err = builder
                .build(Some(&services()), Some(&tts_only()), "S")
                .unwrap_err();
            assert!(err.to_string().contains("backend address"));
        }
    }

    #[test]
    fn test_non_list_initial_messages_rejected() {
        let config = ServiceConfig::from_entries(vec![
            ServiceOption::new("llm").with_option(INITIAL_MESSAGES, "oops"),
        ])
        .unwrap();
        let result = ServiceConfigBuilder::new(Some(URL)).build(Some(&services()), Some(&config), "S");
        assert!(matches!(result, Err(RtviError::Configuration(_))));
    }

    #[test]
    fn test_duplicate_services_rejected() {
        let mut config = tts_only();
        assert!(config.push(ServiceOption::new("tts")).is_err());

        let parsed: ServiceConfig = serde_json::from_value(json!([
            {"service": "tts", "options": []},
            {"service": "tts", "options": []}
        ]))
        .unwrap();
        let result = ServiceConfigBuilder::new(Some(URL)).build(Some(&services()), Some(&parsed), "S");
        assert!(matches!(result, Err(RtviError::Configuration(_))));
    }

    #[test]
    fn test_serializes_as_array() {
        let json = serde_json::to_value(tts_only()).unwrap();
        assert_eq!(
            json,
            json!([{"service": "tts", "options": [{"name": "voice", "value": "narrator"}]}])
        );
    }

    #[test]
    fn test_set_option_replaces_in_place() {
        let mut entry = ServiceOption::new("tts")
            .with_option("voice", "a")
            .with_option("speed", 1.0);
        entry.set_option("voice", "b");
        entry.set_option("model", "sonic");
        assert_eq!(entry.options[0].value, json!("b"));
        assert_eq!(entry.options[2].name, "model");
    }
}
