use rtvi_core::{RtviError, RtviResult};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Service-specific extension that interprets generic messages for one
/// backend service and builds that service's actions.
pub trait Helper: Send + Sync {
    /// Service this helper speaks for, e.g. `llm`.
    fn service(&self) -> &str;

    /// Handle a generic message addressed to this helper's service.
    fn handle_message(&self, payload: &serde_json::Value) -> RtviResult<()>;
}

/// Registry of helpers keyed by service name. At most one helper per name;
/// registering a second one replaces the first.
#[derive(Default)]
pub struct HelperRegistry {
    helpers: HashMap<String, Arc<dyn Helper>>,
}

impl HelperRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `helper` under `service`, returning the helper it replaced.
    pub fn register(
        &mut self,
        service: impl Into<String>,
        helper: Arc<dyn Helper>,
    ) -> Option<Arc<dyn Helper>> {
        let service = service.into();
        let previous = self.helpers.insert(service.clone(), helper);
        if previous.is_some() {
            info!(service = %service, "Replaced helper");
        } else {
            info!(service = %service, "Registered helper");
        }
        previous
    }

    /// Look up the helper for `service`.
    pub fn get(&self, service: &str) -> RtviResult<Arc<dyn Helper>> {
        self.helpers
            .get(service)
            .cloned()
            .ok_or_else(|| RtviError::HelperNotFound(service.to_string()))
    }

    /// Remove the helper for `service`.
    pub fn remove(&mut self, service: &str) -> Option<Arc<dyn Helper>> {
        self.helpers.remove(service)
    }

    /// Registered service names, sorted.
    pub fn services(&self) -> Vec<String> {
        let mut names: Vec<String> = self.helpers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered helpers.
    pub fn len(&self) -> usize {
        self.helpers.len()
    }

    /// Whether no helper is registered.
    pub fn is_empty(&self) -> bool {
        self.helpers.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    struct Tagged(&'static str);

    impl Helper for Tagged {
        fn service(&self) -> &str {
            self.0
        }

        fn handle_message(&self, _payload: &serde_json::Value) -> RtviResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_register_and_get() {
        let mut reg = HelperRegistry::new();
        let h: Arc<dyn Helper> = Arc::new(Tagged("a"));
        assert!(reg.register("llm", h.clone()).is_none());
        assert!(Arc::ptr_eq(&reg.get("llm").unwrap(), &h));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_register_overwrites() {
        let mut reg = HelperRegistry::new();
        let h1: Arc<dyn Helper> = Arc::new(Tagged("h1"));
        let h2: Arc<dyn Helper> = Arc::new(Tagged("h2"));
        reg.register("llm", h1.clone());
        let replaced = reg.register("llm", h2.clone()).unwrap();

        assert!(Arc::ptr_eq(&replaced, &h1));
        assert!(Arc::ptr_eq(&reg.get("llm").unwrap(), &h2));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_get_missing() {
        let reg = HelperRegistry::new();
        let err = reg.get("tts").err().unwrap();
        assert!(matches!(err, RtviError::HelperNotFound(ref s) if s == "tts"));
    }

    #[test]
    fn test_services_sorted_and_remove() {
        let mut reg = HelperRegistry::new();
        reg.register("tts", Arc::new(Tagged("t")));
        reg.register("llm", Arc::new(Tagged("l")));
        assert_eq!(reg.services(), vec!["llm", "tts"]);
        assert!(reg.remove("tts").is_some());
        assert!(reg.remove("tts").is_none());
        assert!(!reg.is_empty());
    }
}
