use async_trait::async_trait;
use rtvi_core::{RtviError, RtviResult, ServiceConfig, Services};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Body of the provisioning call.
#[derive(Debug, Clone, Serialize)]
pub struct ProvisionRequest {
    /// Provider per service.
    pub services: Services,
    /// Merged service configuration.
    pub config: ServiceConfig,
}

/// Starts a bot for a session and returns the backend's raw response.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Provision a bot. The response is handed to the transport unchanged.
    async fn provision(&self, request: &ProvisionRequest) -> RtviResult<serde_json::Value>;
}

/// Provisions by `POST`ing `{services, config}` to a base URL, usually the
/// provisioning proxy that holds the backend credentials.
pub struct HttpProvisioner {
    base_url: String,
    client: reqwest::Client,
}

impl HttpProvisioner {
    /// Creates a provisioner for `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }

    /// The URL requests are sent to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Provisioner for HttpProvisioner {
    async fn provision(&self, request: &ProvisionRequest) -> RtviResult<serde_json::Value> {
        debug!(url = %self.base_url, services = request.services.len(), "Provisioning bot");
        let resp = self
            .client
            .post(&self.base_url)
            .json(request)
            .send()
            .await
            .map_err(|e| RtviError::Transport(format!("provisioning request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "Provisioning rejected");
            return Err(RtviError::Transport(format!(
                "provisioning failed with status {status}: {body}"
            )));
        }

        let body: serde_json::Value = resp.json().await.map_err(|e| {
            RtviError::Transport(format!("provisioning response is not JSON: {e}"))
        })?;
        info!(url = %self.base_url, "Bot provisioned");
        Ok(body)
    }
}

/// Returns a fixed response. For backends reachable without a provisioning
/// step, or for wiring a session to an in-memory transport.
pub struct StaticProvisioner {
    response: serde_json::Value,
}

impl StaticProvisioner {
    /// Creates a provisioner that always answers `response`.
    pub fn new(response: serde_json::Value) -> Self {
        Self { response }
    }
}

#[async_trait]
impl Provisioner for StaticProvisioner {
    async fn provision(&self, _request: &ProvisionRequest) -> RtviResult<serde_json::Value> {
        Ok(self.response.clone())
    }
}
