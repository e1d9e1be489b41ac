use crate::config::ProxyConfig;
use crate::forward::{BotForwarder, BotStartPayload, StartRequest};
use axum::{
    body::Bytes,
    extract::{Request, State},
    http::StatusCode,
    middleware::{self as axum_mw, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use rtvi_core::{RtviError, RtviResult};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// Shared proxy state.
pub struct ProxyState {
    /// Proxy settings, secrets included.
    pub config: ProxyConfig,
    /// Outbound client for the bot backend.
    pub forwarder: BotForwarder,
}

/// The provisioning proxy.
///
/// Clients `POST /api` with `{services, config}`; the proxy adds the
/// backend credentials and bot settings it holds and forwards the request.
pub struct ProxyServer;

impl ProxyServer {
    /// Build the proxy router.
    pub fn build(config: ProxyConfig) -> Router {
        let state = Arc::new(ProxyState {
            config,
            forwarder: BotForwarder::new(),
        });

        Router::new()
            .route("/api", post(start_bot_handler))
            .route("/health", get(health_handler))
            .layer(axum_mw::from_fn(log_requests))
            .with_state(state)
    }

    /// Bind `config.bind` and serve until the process is stopped.
    pub async fn serve(config: ProxyConfig) -> RtviResult<()> {
        let bind = config.bind.clone();
        if config.bots_url.is_none() {
            warn!("No bot backend URL configured, every start request will be rejected");
        }
        let listener = TcpListener::bind(&bind).await?;
        info!(addr = %bind, "Provisioning proxy listening");
        axum::serve(listener, Self::build(config)).await?;
        Ok(())
    }
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok", "service": "rtvi"}))
}

async fn start_bot_handler(State(state): State<Arc<ProxyState>>, body: Bytes) -> Response {
    match start_bot(&state, &body).await {
        Ok((status, body)) => (status, Json(body)).into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}

async fn start_bot(state: &ProxyState, body: &[u8]) -> RtviResult<(StatusCode, serde_json::Value)> {
    let request: StartRequest = serde_json::from_slice(body)?;
    let payload = BotStartPayload::from_request(&state.config, &request)?;
    let url = state
        .config
        .bots_url
        .as_deref()
        .ok_or_else(|| RtviError::Configuration("backend address is not configured".into()))?;

    let response = state
        .forwarder
        .forward(url, state.config.api_key.as_deref(), &payload)
        .await?;
    let status = StatusCode::from_u16(response.status).map_err(|e| RtviError::Http(e.to_string()))?;
    if !status.is_success() {
        warn!(status = %status, "Bot backend rejected start request");
    }
    Ok((status, response.body))
}

/// Maps library errors onto proxy responses: configuration problems are the
/// client's fault (400), everything else is ours (500).
struct ApiError(RtviError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self.0 {
            RtviError::Configuration(detail) => {
                warn!(detail = %detail, "Rejected start request");
                (StatusCode::BAD_REQUEST, detail).into_response()
            }
            other => {
                error!(error = %other, "Start request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Internal Server Error: {other}"),
                )
                    .into_response()
            }
        }
    }
}

async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();
    let response = next.run(request).await;
    info!(
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Request handled"
    );
    response
}
