//! OpenAI-compatible chat completions
//!
//! One blocking client serves two roles: the reasoning service behind the
//! orchestration loop (function calling) and the mix judge (plain text).

use serde_json::{json, Value};
use tracing::debug;

use crate::agent::context::{Conversation, Message, MessageRole};
use crate::agent::operations::OperationSchema;
use crate::agent::reasoning::{OperationCall, ReasoningService, ReasoningTurn};
use crate::config::MixerConfig;
use crate::error::{MixerError, Result};
use crate::feedback::judge::{JudgeRequest, Judgment, MixJudge, JUDGE_SYSTEM_PROMPT};

const SERVICE: &str = "openai";
const JUDGE_TEMPERATURE: f32 = 0.7;
const JUDGE_MAX_TOKENS: u32 = 1500;

#[derive(Debug, Clone)]
pub struct OpenAiClient {
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    timeout_ms: u64,
}

impl OpenAiClient {
    pub fn new(config: &MixerConfig) -> Self {
        Self {
            base_url: config.services.openai_base_url.trim_end_matches('/').to_string(),
            api_key: config.services.openai_api_key.clone(),
            model: config.services.model.clone(),
            temperature: config.services.temperature,
            max_tokens: config.services.max_tokens,
            timeout_ms: config.services.timeout_ms,
        }
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn request_body(
        &self,
        messages: Vec<Value>,
        tools: &[OperationSchema],
        temperature: f32,
        max_tokens: u32,
    ) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": temperature,
            "max_tokens": max_tokens,
        });
        if !tools.is_empty() {
            body["tools"] = Value::Array(tools.iter().map(OperationSchema::to_tool).collect());
            body["tool_choice"] = json!("auto");
        }
        body
    }

    #[cfg(feature = "remote")]
    fn complete(&self, body: &Value) -> Result<Value> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| MixerError::dependency(SERVICE, "OPENAI_API_KEY is not set"))?;

        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_millis(self.timeout_ms))
            .build()
            .map_err(|e| MixerError::dependency(SERVICE, e))?;

        let url = format!("{}/chat/completions", self.base_url);
        debug!(url = %url, model = %self.model, "sending chat completion");

        let response = client
            .post(&url)
            .bearer_auth(api_key)
            .json(body)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    MixerError::dependency(SERVICE, format!("timed out after {}ms", self.timeout_ms))
                } else {
                    MixerError::dependency(SERVICE, e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().unwrap_or_default();
            return Err(MixerError::dependency(
                SERVICE,
                format!("{} returned {}: {}", url, status, detail),
            ));
        }

        response.json::<Value>().map_err(|e| MixerError::MalformedResponse {
            service: SERVICE.to_string(),
            reason: e.to_string(),
        })
    }

    #[cfg(not(feature = "remote"))]
    fn complete(&self, _body: &Value) -> Result<Value> {
        Err(MixerError::dependency(
            SERVICE,
            "HTTP support not compiled. Build with --features remote",
        ))
    }
}

impl ReasoningService for OpenAiClient {
    fn next_turn(
        &self,
        conversation: &Conversation,
        operations: &[OperationSchema],
    ) -> Result<ReasoningTurn> {
        let body = self.request_body(
            wire_messages(conversation),
            operations,
            self.temperature,
            self.max_tokens,
        );
        let response = self.complete(&body)?;
        parse_turn(&response)
    }
}

impl MixJudge for OpenAiClient {
    fn judge(&self, request: &JudgeRequest) -> Result<Judgment> {
        let messages = vec![
            json!({"role": "system", "content": JUDGE_SYSTEM_PROMPT}),
            json!({"role": "user", "content": request.render_prompt()}),
        ];
        let body = self.request_body(messages, &[], JUDGE_TEMPERATURE, JUDGE_MAX_TOKENS);
        let response = self.complete(&body)?;
        let turn = parse_turn(&response)?;
        Ok(Judgment::Text(turn.content.unwrap_or_default()))
    }
}

// ============================================================================
// Wire format
// ============================================================================

fn wire_message(message: &Message) -> Value {
    match message.role {
        MessageRole::Assistant if !message.invocations.is_empty() => {
            let tool_calls: Vec<Value> = message
                .invocations
                .iter()
                .map(|call| {
                    let arguments = match &call.arguments {
                        Value::String(raw) => raw.clone(),
                        other => other.to_string(),
                    };
                    json!({
                        "id": call.id,
                        "type": "function",
                        "function": {"name": call.name, "arguments": arguments},
                    })
                })
                .collect();
            let content = if message.content.is_empty() {
                Value::Null
            } else {
                json!(message.content)
            };
            json!({"role": "assistant", "content": content, "tool_calls": tool_calls})
        }
        MessageRole::Tool => json!({
            "role": "tool",
            "tool_call_id": message.tool_call_id,
            "content": message.content,
        }),
        role => json!({"role": role.as_str(), "content": message.content}),
    }
}

/// Conversation history as chat-completion messages
pub fn wire_messages(conversation: &Conversation) -> Vec<Value> {
    conversation.messages.iter().map(wire_message).collect()
}

/// Read the first choice of a chat-completion response
///
/// Tool-call arguments that are not valid JSON are kept as a raw string so
/// that decoding reports them as a bad-argument error.
pub fn parse_turn(response: &Value) -> Result<ReasoningTurn> {
    let message = response
        .pointer("/choices/0/message")
        .ok_or_else(|| MixerError::MalformedResponse {
            service: SERVICE.to_string(),
            reason: "response has no choices".to_string(),
        })?;

    let content = message
        .get("content")
        .and_then(Value::as_str)
        .map(str::to_string);

    let invocations = message
        .get("tool_calls")
        .and_then(Value::as_array)
        .map(|calls| calls.iter().filter_map(parse_call).collect())
        .unwrap_or_default();

    Ok(ReasoningTurn {
        content,
        invocations,
    })
}

fn parse_call(call: &Value) -> Option<OperationCall> {
    let function = call.get("function")?;
    let name = function.get("name")?.as_str()?;
    let arguments = match function.get("arguments") {
        Some(Value::String(raw)) => {
            serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.clone()))
        }
        Some(other) => other.clone(),
        None => Value::Null,
    };
    let mut operation = OperationCall::new(name, arguments);
    if let Some(id) = call.get("id").and_then(Value::as_str) {
        operation.id = id.to_string();
    }
    Some(operation)
}
