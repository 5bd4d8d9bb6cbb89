//! Orchestration controller
//!
//! Drives a bounded conversation with the reasoning service. Each turn the
//! service either answers (the run completes) or requests operations,
//! which are executed in order with their payloads appended to history.

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::context::Conversation;
use super::operations::operation_schemas;
use super::reasoning::ReasoningService;
use super::registry::ToolRegistry;
use crate::config::MixerConfig;
use crate::services::analysis::BasicFeatureExtractor;
use crate::services::discovery::HttpDiscovery;
use crate::services::openai::OpenAiClient;

pub const SYSTEM_PROMPT: &str = "You are an expert AI music producer and DJ. Your job is to create amazing music mixes based on user requests using the available tools.

Your workflow should be:
1. Analyze the user's request to understand the desired mood, genre, energy, and style
2. Use music_discovery_tool to find appropriate royalty-free tracks
3. Use batch_audio_analysis_tool to analyze the downloaded tracks
4. Use mix_generation_tool to create an initial mix
5. Use iterative_improvement_tool to get feedback and improve the mix
6. Use final_mix_export_tool to export the final result
7. Use create_mix_package_tool to create a complete package

Be creative and thoughtful about track selection, transitions, and overall flow. Consider energy progression, key compatibility, and mood consistency.";

const SUGGESTION_SYSTEM_PROMPT: &str =
    "You are a creative music curator. Generate inspiring mix prompts.";

const SUGGESTION_COUNT: usize = 5;

/// How a `create_mix` run ended
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MixRun {
    Completed {
        final_response: String,
        turns: usize,
        conversation: Conversation,
    },
    MaxTurnsReached {
        turns: usize,
        conversation: Conversation,
    },
    Error {
        error: String,
        turns: usize,
        conversation: Conversation,
    },
}

impl MixRun {
    pub fn status(&self) -> &'static str {
        match self {
            MixRun::Completed { .. } => "completed",
            MixRun::MaxTurnsReached { .. } => "max_iterations_reached",
            MixRun::Error { .. } => "error",
        }
    }

    pub fn turns(&self) -> usize {
        match self {
            MixRun::Completed { turns, .. }
            | MixRun::MaxTurnsReached { turns, .. }
            | MixRun::Error { turns, .. } => *turns,
        }
    }

    pub fn conversation(&self) -> &Conversation {
        match self {
            MixRun::Completed { conversation, .. }
            | MixRun::MaxTurnsReached { conversation, .. }
            | MixRun::Error { conversation, .. } => conversation,
        }
    }
}

pub struct Orchestrator {
    reasoning: Box<dyn ReasoningService>,
    registry: ToolRegistry,
    max_turns: usize,
}

impl Orchestrator {
    pub fn new(
        config: &MixerConfig,
        reasoning: Box<dyn ReasoningService>,
        registry: ToolRegistry,
    ) -> Self {
        Self {
            reasoning,
            registry,
            max_turns: config.policy.max_turns,
        }
    }

    /// Wire the HTTP-backed collaborators from configuration
    pub fn from_config(config: &MixerConfig) -> Self {
        let client = OpenAiClient::new(config);
        let registry = ToolRegistry::new(
            config,
            Box::new(HttpDiscovery::new(config)),
            Box::new(BasicFeatureExtractor::new()),
            Box::new(client.clone()),
        );
        Self::new(config, Box::new(client), registry)
    }

    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Run the turn loop for one mix request
    ///
    /// # Arguments
    /// * `prompt` - The user's description of the mix
    /// * `max_duration_minutes` - Target length passed on to the reasoning service
    ///
    /// # Returns
    /// The terminal state with the full conversation
    pub fn create_mix(&mut self, prompt: &str, max_duration_minutes: u32) -> MixRun {
        info!(prompt = %prompt, "starting mix creation");

        let request = format!(
            "Create a music mix based on this request: {}. Target duration should be around {} minutes.",
            prompt, max_duration_minutes
        );
        let mut conversation = Conversation::seeded(SYSTEM_PROMPT, &request);
        let schemas = operation_schemas();

        for turn in 1..=self.max_turns {
            debug!(turn, "requesting next turn");
            let reply = match self.reasoning.next_turn(&conversation, schemas) {
                Ok(reply) => reply,
                Err(e) => {
                    warn!(turn, error = %e, "reasoning service failed");
                    return MixRun::Error {
                        error: e.to_string(),
                        turns: turn,
                        conversation,
                    };
                }
            };
            conversation.add_assistant_turn(&reply);

            if reply.is_final() {
                let final_response = reply.content.unwrap_or_default();
                info!(turns = turn, "mix creation completed");
                return MixRun::Completed {
                    final_response,
                    turns: turn,
                    conversation,
                };
            }

            info!(turn, operations = reply.invocations.len(), "executing operations");
            for call in &reply.invocations {
                let payload = self.registry.invoke(call);
                log_payload(&call.name, &payload);
                conversation.add_tool_result(call, &payload);
            }
        }

        warn!(max_turns = self.max_turns, "turn budget exhausted");
        MixRun::MaxTurnsReached {
            turns: self.max_turns,
            conversation,
        }
    }

    /// Ask the reasoning service for mix prompt ideas
    ///
    /// Always yields prompts: an unparseable reply is split into lines and
    /// a failed call falls back to built-in prompts.
    pub fn get_mix_suggestions(
        &self,
        mood: &str,
        genre: Option<&str>,
        duration_minutes: u32,
    ) -> Vec<String> {
        let request = format!(
            "Generate 5 creative music mix prompts for:\n- Mood: {}\n- Genre: {}\n- Duration: ~{} minutes\n\nEach prompt should be specific and inspiring, mentioning energy flow, transitions, and vibe.\nReturn as a JSON list of strings.",
            mood,
            genre.unwrap_or("any"),
            duration_minutes
        );
        let conversation = Conversation::seeded(SUGGESTION_SYSTEM_PROMPT, &request);

        match self.reasoning.next_turn(&conversation, &[]) {
            Ok(turn) => {
                let text = turn.content.unwrap_or_default();
                let suggestions = parse_suggestions(&text);
                if suggestions.is_empty() {
                    fallback_suggestions(mood, duration_minutes)
                } else {
                    suggestions
                }
            }
            Err(e) => {
                warn!(error = %e, "suggestion request failed, using built-in prompts");
                fallback_suggestions(mood, duration_minutes)
            }
        }
    }
}

fn log_payload(name: &str, payload: &Value) {
    if let Some(error) = payload.get("error") {
        warn!(operation = %name, error = %error, "operation returned an error");
    } else if payload.get("status").and_then(Value::as_str) == Some("success") {
        info!(operation = %name, "operation completed successfully");
    } else {
        info!(operation = %name, "operation completed");
    }
}

/// A JSON list of strings, else the first non-empty lines
pub fn parse_suggestions(text: &str) -> Vec<String> {
    let trimmed = text.trim();
    if let Ok(list) = serde_json::from_str::<Vec<String>>(trimmed) {
        return list.into_iter().take(SUGGESTION_COUNT).collect();
    }
    if let (Some(start), Some(end)) = (trimmed.find('['), trimmed.rfind(']')) {
        if start < end {
            if let Ok(list) = serde_json::from_str::<Vec<String>>(&trimmed[start..=end]) {
                return list.into_iter().take(SUGGESTION_COUNT).collect();
            }
        }
    }
    trimmed
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .take(SUGGESTION_COUNT)
        .map(str::to_string)
        .collect()
}

pub fn fallback_suggestions(mood: &str, duration_minutes: u32) -> Vec<String> {
    vec![
        format!("Create a {} mix with smooth transitions", mood),
        format!(
            "Build a {}-minute journey through {} vibes",
            duration_minutes, mood
        ),
        format!("Mix {} tracks with perfect energy flow", mood),
        format!("Craft a {} atmosphere with seamless blending", mood),
        format!("Design a {} experience with dynamic progression", mood),
    ]
}
