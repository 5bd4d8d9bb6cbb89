//! Reasoning service seam
//!
//! The controller asks an external reasoning capability for the next turn
//! of the conversation. A turn is either a final answer or a list of
//! operation invocations to execute.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::context::Conversation;
use super::operations::OperationSchema;
use crate::error::Result;

/// A request to run one named operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

impl OperationCall {
    pub fn new(name: &str, arguments: Value) -> Self {
        Self {
            id: format!("call_{}", Uuid::new_v4().simple()),
            name: name.to_string(),
            arguments,
        }
    }
}

/// One reply from the reasoning service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReasoningTurn {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub invocations: Vec<OperationCall>,
}

impl ReasoningTurn {
    /// A turn that ends the conversation
    pub fn answer(content: &str) -> Self {
        Self {
            content: Some(content.to_string()),
            invocations: Vec::new(),
        }
    }

    /// A turn that requests operations
    pub fn calls(invocations: Vec<OperationCall>) -> Self {
        Self {
            content: None,
            invocations,
        }
    }

    pub fn is_final(&self) -> bool {
        self.invocations.is_empty()
    }
}

/// External capability choosing what happens next
pub trait ReasoningService {
    fn next_turn(
        &self,
        conversation: &Conversation,
        operations: &[OperationSchema],
    ) -> Result<ReasoningTurn>;
}
