use crate::helper::Helper;
use rtvi_core::{LlmMessage, OutboundAction, RtviError, RtviResult, LLM_SERVICE};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

type TextCallback = Box<dyn Fn(&str) + Send + Sync>;
type FunctionCallCallback = Box<dyn Fn(&FunctionCall) + Send + Sync>;
type ContextCallback = Box<dyn Fn(&[LlmMessage]) + Send + Sync>;

/// A tool invocation requested by the LLM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Name of the function the model wants to run.
    pub function_name: String,
    /// Identifier to echo back with the result.
    pub tool_call_id: String,
    /// Arguments as produced by the model.
    #[serde(default)]
    pub args: Value,
}

/// Helper for the `llm` service.
///
/// Builds context-management actions and dispatches inbound LLM payloads to
/// the callbacks registered with [`on_text`](Self::on_text),
/// [`on_function_call`](Self::on_function_call) and
/// [`on_context`](Self::on_context).
///
/// ```ignore
/// let llm = LlmHelper::new().on_text(|t| print!("{t}"));
/// session.register_helper(LLM_SERVICE, Arc::new(llm));
/// session
///     .call(LlmHelper::append_to_messages(&[LlmMessage::user("Go on")], true))
///     .await?;
/// ```
#[derive(Default)]
pub struct LlmHelper {
    on_text: Option<TextCallback>,
    on_function_call: Option<FunctionCallCallback>,
    on_context: Option<ContextCallback>,
}

impl LlmHelper {
    /// Creates a helper with no callbacks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Called with each streamed chunk of model text.
    pub fn on_text<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_text = Some(Box::new(callback));
        self
    }

    /// Called when the model requests a function call.
    pub fn on_function_call<F>(mut self, callback: F) -> Self
    where
        F: Fn(&FunctionCall) + Send + Sync + 'static,
    {
        self.on_function_call = Some(Box::new(callback));
        self
    }

    /// Called with a context snapshot, usually the answer to `get_context`.
    pub fn on_context<F>(mut self, callback: F) -> Self
    where
        F: Fn(&[LlmMessage]) + Send + Sync + 'static,
    {
        self.on_context = Some(Box::new(callback));
        self
    }

    /// Append `messages` to the bot's context, optionally running the model.
    pub fn append_to_messages(messages: &[LlmMessage], run_immediately: bool) -> OutboundAction {
        OutboundAction::new(LLM_SERVICE, "append_to_messages")
            .with_argument("messages", messages_value(messages))
            .with_argument("run_immediately", run_immediately)
    }

    /// Ask for the current context.
    pub fn get_context() -> OutboundAction {
        OutboundAction::new(LLM_SERVICE, "get_context")
    }

    /// Replace the context.
    pub fn set_context(messages: &[LlmMessage], interrupt: bool) -> OutboundAction {
        OutboundAction::new(LLM_SERVICE, "set_context")
            .with_argument("messages", messages_value(messages))
            .with_argument("interrupt", interrupt)
    }

    /// Run the model on the current context.
    pub fn run(interrupt: bool) -> OutboundAction {
        OutboundAction::new(LLM_SERVICE, "run").with_argument("interrupt", interrupt)
    }

    /// Parse the `messages` list out of a `get_context` response.
    pub fn context_from_response(response: &Value) -> RtviResult<Vec<LlmMessage>> {
        let messages = response
            .get("messages")
            .or_else(|| response.get("result").and_then(|r| r.get("messages")))
            .ok_or_else(|| RtviError::Protocol("context response carries no messages".into()))?;
        Ok(serde_json::from_value(messages.clone())?)
    }
}

fn messages_value(messages: &[LlmMessage]) -> Value {
    Value::Array(
        messages
            .iter()
            .map(|m| serde_json::json!({"role": m.role, "content": m.content}))
            .collect(),
    )
}

impl Helper for LlmHelper {
    fn service(&self) -> &str {
        LLM_SERVICE
    }

    fn handle_message(&self, payload: &Value) -> RtviResult<()> {
        if payload.get("function_name").is_some() {
            let call: FunctionCall = serde_json::from_value(payload.clone())?;
            debug!(function = %call.function_name, tool_call_id = %call.tool_call_id, "LLM function call");
            if let Some(cb) = &self.on_function_call {
                cb(&call);
            }
            return Ok(());
        }

        if let Some(messages) = payload.get("messages") {
            let messages: Vec<LlmMessage> = serde_json::from_value(messages.clone())?;
            if let Some(cb) = &self.on_context {
                cb(&messages);
            }
            return Ok(());
        }

        if let Some(text) = payload.get("text").and_then(Value::as_str) {
            if let Some(cb) = &self.on_text {
                cb(text);
            }
            return Ok(());
        }

        Err(RtviError::Protocol(format!(
            "unrecognised llm payload: {payload}"
        )))
    }
}
