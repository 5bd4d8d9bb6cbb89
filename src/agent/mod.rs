//! Orchestration Controller
//!
//! This module provides:
//! - The closed set of operations and their schemas
//! - Conversation state shared with the reasoning service
//! - Operation dispatch to the mix, feedback and service layers
//! - The bounded turn loop

pub mod context;
pub mod controller;
pub mod operations;
pub mod reasoning;
pub mod registry;

pub use context::{Conversation, Message, MessageRole};
pub use controller::{fallback_suggestions, parse_suggestions, MixRun, Orchestrator, SYSTEM_PROMPT};
pub use operations::{operation_schemas, Operation, OperationSchema};
pub use reasoning::{OperationCall, ReasoningService, ReasoningTurn};
pub use registry::ToolRegistry;
