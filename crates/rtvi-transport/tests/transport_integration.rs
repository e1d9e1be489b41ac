#![allow(clippy::unwrap_used, clippy::expect_used)]

use futures_util::{SinkExt, StreamExt};
use rtvi_core::{OutboundMessage, RtviError, ServiceConfig, ServiceOption, Services};
use rtvi_transport::*;
use serde_json::json;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn request() -> ProvisionRequest {
    let mut services = Services::new();
    services.insert("llm".into(), "openai".into());
    ProvisionRequest {
        services,
        config: ServiceConfig::from_entries(vec![ServiceOption::new("tts")]).unwrap(),
    }
}

// ---------------------------------------------------------------------------
// HttpProvisioner
// ---------------------------------------------------------------------------

#[tokio::test]
async fn provisioner_posts_services_and_config() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api"))
        .and(body_partial_json(json!({
            "services": {"llm": "openai"},
            "config": [{"service": "tts", "options": []}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "room_url": "wss://bots.example.com/room",
            "token": "t0k"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provisioner = HttpProvisioner::new(format!("{}/api", server.uri()));
    let body = provisioner.provision(&request()).await.unwrap();

    let params = ConnectParams::from_provision(body);
    assert_eq!(params.url.as_deref(), Some("wss://bots.example.com/room"));
    assert_eq!(params.token.as_deref(), Some("t0k"));
}

#[tokio::test]
async fn provisioner_non_success_is_transport_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_string("Services, config, or bots url not found"))
        .mount(&server)
        .await;

    let err = HttpProvisioner::new(server.uri())
        .provision(&request())
        .await
        .unwrap_err();
    assert!(matches!(err, RtviError::Transport(_)));
    assert!(err.to_string().contains("400"));
    assert!(err.to_string().contains("not found"));
}

#[tokio::test]
async fn provisioner_non_json_body_is_transport_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let err = HttpProvisioner::new(server.uri())
        .provision(&request())
        .await
        .unwrap_err();
    assert!(matches!(err, RtviError::Transport(_)));
}

#[tokio::test]
async fn provisioner_unreachable_is_transport_error() {
    let err = HttpProvisioner::new("http://127.0.0.1:1/api")
        .provision(&request())
        .await
        .unwrap_err();
    assert!(matches!(err, RtviError::Transport(_)));
}

// ---------------------------------------------------------------------------
// WebSocketTransport against a local echo bot
// ---------------------------------------------------------------------------

/// Accepts one WebSocket client, greets it with `bot-ready`, then answers
/// every action with an `action-response` carrying the same id.
async fn start_bot() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.send(Message::Text(json!({"type": "bot-ready", "label": "rtvi-ai"}).to_string()))
            .await
            .unwrap();
        while let Some(Ok(msg)) = ws.next().await {
            match msg {
                Message::Text(text) => {
                    let frame: serde_json::Value = serde_json::from_str(&text).unwrap();
                    let reply = json!({
                        "id": frame["id"],
                        "label": "rtvi-ai",
                        "type": "action-response",
                        "data": {"result": frame["data"]["action"]}
                    });
                    ws.send(Message::Text(reply.to_string())).await.unwrap();
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    format!("ws://{addr}")
}

#[tokio::test]
async fn websocket_round_trip() {
    let url = start_bot().await;
    let transport = WebSocketTransport::new();
    let params = ConnectParams::from_provision(json!({ "url": url }));
    let mut rx = transport.connect(&params).await.unwrap();

    let first = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    let TransportEvent::Frame(frame) = first else {
        panic!("expected a frame, got {first:?}");
    };
    assert_eq!(decode(frame).unwrap(), InboundFrame::Event(rtvi_core::InboundEvent::Ready));

    let msg = OutboundMessage::with_id("1", "action", json!({"service": "llm", "action": "get_context"}));
    transport.send(&msg).await.unwrap();

    let reply = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    let TransportEvent::Frame(frame) = reply else {
        panic!("expected a frame, got {reply:?}");
    };
    assert_eq!(
        decode(frame).unwrap(),
        InboundFrame::ActionResponse {
            id: "1".into(),
            payload: json!({"result": "get_context"})
        }
    );

    transport.disconnect().await.unwrap();
    assert!(transport.send(&msg).await.is_err());
}

#[tokio::test]
async fn websocket_connect_refused() {
    let transport = WebSocketTransport::new();
    let params = ConnectParams::from_provision(json!({"url": "ws://127.0.0.1:1"}));
    let err = transport.connect(&params).await.unwrap_err();
    assert!(matches!(err, RtviError::Transport(_)));
}
