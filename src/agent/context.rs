//! Conversation state
//!
//! The ordered message history shared with the reasoning service: the
//! system prompt, the user's request, assistant turns and the payload of
//! every operation the controller ran.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::reasoning::{OperationCall, ReasoningTurn};

/// Who sent the message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::Tool => "tool",
        }
    }
}

/// A message in the conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    pub role: MessageRole,

    pub content: String,

    pub timestamp: DateTime<Utc>,

    /// Operations requested by an assistant message
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub invocations: Vec<OperationCall>,

    /// Invocation a tool message answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    fn with_role(role: MessageRole, content: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.to_string(),
            timestamp: Utc::now(),
            invocations: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn system(content: &str) -> Self {
        Self::with_role(MessageRole::System, content)
    }

    pub fn user(content: &str) -> Self {
        Self::with_role(MessageRole::User, content)
    }

    pub fn assistant(turn: &ReasoningTurn) -> Self {
        let mut msg = Self::with_role(
            MessageRole::Assistant,
            turn.content.as_deref().unwrap_or_default(),
        );
        msg.invocations = turn.invocations.clone();
        msg
    }

    /// The JSON payload produced by running `call`
    pub fn tool(call: &OperationCall, payload: &Value) -> Self {
        let mut msg = Self::with_role(MessageRole::Tool, &payload.to_string());
        msg.tool_call_id = Some(call.id.clone());
        msg
    }

    /// Parsed payload of a tool message
    pub fn payload(&self) -> Option<Value> {
        match self.role {
            MessageRole::Tool => serde_json::from_str(&self.content).ok(),
            _ => None,
        }
    }
}

/// Full conversation history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub session_id: String,
    pub messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            messages: Vec::new(),
        }
    }

    /// Conversation seeded with a system prompt and a user request
    pub fn seeded(system_prompt: &str, request: &str) -> Self {
        let mut conversation = Self::new();
        conversation.push(Message::system(system_prompt));
        conversation.push(Message::user(request));
        conversation
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn add_assistant_turn(&mut self, turn: &ReasoningTurn) {
        self.push(Message::assistant(turn));
    }

    pub fn add_tool_result(&mut self, call: &OperationCall, payload: &Value) {
        self.push(Message::tool(call, payload));
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Payloads of every tool message, in order
    pub fn tool_payloads(&self) -> Vec<Value> {
        self.messages.iter().filter_map(Message::payload).collect()
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}
