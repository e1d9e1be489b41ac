#![allow(clippy::unwrap_used, clippy::expect_used)]

use rtvi_core::*;
use serde_json::json;

// ---------------------------------------------------------------------------
// 1. Config loaded from JSON goes through the builder like the demo defaults
// ---------------------------------------------------------------------------

#[test]
fn demo_config_from_json_is_merged() {
    let services: Services = serde_json::from_value(json!({
        "llm": "openai",
        "tts": "cartesia"
    }))
    .unwrap();
    let config: ServiceConfig = serde_json::from_value(json!([
        {"service": "tts", "options": [{"name": "voice", "value": "79a125e8"}]},
        {"service": "llm", "options": [
            {"name": "model", "value": "gpt-4o"},
            {"name": "run_on_config", "value": true}
        ]}
    ]))
    .unwrap();

    let merged = ServiceConfigBuilder::new(Some("https://api.daily.co/v1/bots/start"))
        .build(Some(&services), Some(&config), "You are a storyteller.")
        .unwrap();

    let json = serde_json::to_value(&merged).unwrap();
    assert_eq!(json[0]["service"], "tts");
    assert_eq!(json[1]["service"], "llm");
    assert_eq!(json[1]["options"][0]["name"], "model");
    assert_eq!(json[1]["options"][2]["name"], "initial_messages");
    assert_eq!(
        json[1]["options"][2]["value"],
        json!([{"role": "system", "content": "You are a storyteller."}])
    );
}

// ---------------------------------------------------------------------------
// 2. Building twice prepends twice (merge is not idempotent)
// ---------------------------------------------------------------------------

#[test]
fn repeated_build_stacks_system_messages() {
    let mut services = Services::new();
    services.insert("llm".into(), "openai".into());
    let config = ServiceConfig::from_entries(vec![ServiceOption::new("tts")]).unwrap();
    let builder = ServiceConfigBuilder::new(Some("http://localhost:7860"));

    let once = builder.build(Some(&services), Some(&config), "A").unwrap();
    let twice = builder.build(Some(&services), Some(&once), "B").unwrap();

    let messages = &twice.service(LLM_SERVICE).unwrap().option(INITIAL_MESSAGES).unwrap().value;
    assert_eq!(messages[0]["content"], "B");
    assert_eq!(messages[1]["content"], "A");
    assert_eq!(twice.len(), 2);
}

// ---------------------------------------------------------------------------
// 3. Inbound events serialize with a type tag
// ---------------------------------------------------------------------------

#[test]
fn inbound_event_tagging() {
    let event = InboundEvent::GenericMessage {
        service_label: "llm".into(),
        payload: json!({"text": "Once upon a time"}),
    };
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["type"], "generic_message");
    assert_eq!(json["service_label"], "llm");

    let back: InboundEvent = serde_json::from_value(json).unwrap();
    assert_eq!(back, event);
}

// ---------------------------------------------------------------------------
// 4. Error display strings
// ---------------------------------------------------------------------------

#[test]
fn error_display() {
    assert_eq!(
        RtviError::Timeout { timeout_ms: 15000 }.to_string(),
        "Timed out after 15000ms waiting for the bot to become ready"
    );
    assert_eq!(
        RtviError::HelperNotFound("llm".into()).to_string(),
        "No helper registered for service 'llm'"
    );
    assert_eq!(
        RtviError::Backend { detail: "bad arg".into() }.to_string(),
        "Backend error: bad arg"
    );
}
