//! Mix judgment: the judge capability and the strategies that read its output

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::engine::import_audio;
use crate::error::{MixerError, Result};
use crate::feedback::record::{FeedbackRecord, Suggestion, FALLBACK_RATING};

/// System message sent with every judgment request
pub const JUDGE_SYSTEM_PROMPT: &str =
    "You are an expert music producer and DJ providing detailed feedback on music mixes.";

const TEXT_MODE_NOTE: &str = "Analysis not available in text mode";

// ============================================================================
// Judge capability
// ============================================================================

/// Everything a judge is told about a mix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeRequest {
    pub mix_path: PathBuf,
    pub prompt: String,
    #[serde(default)]
    pub mix_metadata: Option<Value>,
    pub duration_seconds: f64,
}

impl JudgeRequest {
    /// Render the user message asking for structured feedback
    pub fn render_prompt(&self) -> String {
        let metadata = self
            .mix_metadata
            .as_ref()
            .and_then(|m| serde_json::to_string_pretty(m).ok())
            .unwrap_or_else(|| "No metadata available".to_string());
        let file_name = self
            .mix_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        format!(
            "You are an expert music producer and DJ reviewing an AI-generated music mix.\n\n\
             Mix Request: {prompt}\n\n\
             Mix Metadata:\n{metadata}\n\n\
             Please analyze this mix and provide structured feedback in JSON format with the following structure:\n\
             {{\n\
             \x20 \"overall_rating\": 1-10,\n\
             \x20 \"matches_request\": true/false,\n\
             \x20 \"feedback\": \"detailed feedback text\",\n\
             \x20 \"specific_issues\": [{{\"timestamp_ms\": 0, \"issue\": \"description\", \"severity\": \"low/medium/high\"}}],\n\
             \x20 \"suggestions\": [{{\"action\": \"trim/volume_adjust/fade_adjustment/eq/crossfade\", \"parameters\": {{}}, \"reason\": \"explanation\"}}],\n\
             \x20 \"energy_flow\": \"description of energy progression\",\n\
             \x20 \"transition_quality\": \"assessment of transitions\",\n\
             \x20 \"technical_issues\": [\"list of technical problems\"],\n\
             \x20 \"creative_suggestions\": [\"list of creative improvements\"]\n\
             }}\n\n\
             Focus on how well the mix matches the request, transition quality, energy flow, \
             technical audio quality and specific actionable improvements.\n\n\
             Mix file: {file_name}\nDuration: {duration} seconds",
            prompt = self.prompt,
            metadata = metadata,
            file_name = file_name,
            duration = self.duration_seconds,
        )
    }
}

/// What a judge returned
#[derive(Debug, Clone, PartialEq)]
pub enum Judgment {
    Structured(FeedbackRecord),
    Text(String),
}

/// External capability that rates a mix
pub trait MixJudge {
    fn judge(&self, request: &JudgeRequest) -> Result<Judgment>;
}

// ============================================================================
// Strategies
// ============================================================================

/// Turns a judge's free text into a feedback record
pub trait FeedbackStrategy {
    fn name(&self) -> &'static str;

    fn parse(&self, text: &str) -> Result<FeedbackRecord>;
}

/// Reads the first JSON object in the text as a feedback record
///
/// The outermost `{...}` is tried first, then each opening brace in turn.
/// Fields with an unexpected shape decode to their defaults.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuredJudgment;

impl FeedbackStrategy for StructuredJudgment {
    fn name(&self) -> &'static str {
        "structured"
    }

    fn parse(&self, text: &str) -> Result<FeedbackRecord> {
        let malformed = |reason: String| MixerError::MalformedResponse {
            service: "judge".to_string(),
            reason,
        };

        let object =
            json_object(text).ok_or_else(|| malformed("no JSON object in response".to_string()))?;
        serde_json::from_value(object).map_err(|e| malformed(e.to_string()))
    }
}

fn json_object(text: &str) -> Option<Value> {
    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if end > start {
            if let Ok(value @ Value::Object(_)) =
                serde_json::from_str::<Value>(&text[start..=end])
            {
                return Some(value);
            }
        }
    }

    // Prose around the object may itself contain braces
    text.match_indices('{').find_map(|(start, _)| {
        let mut stream = serde_json::Deserializer::from_str(&text[start..]).into_iter::<Value>();
        match stream.next() {
            Some(Ok(value @ Value::Object(_))) => Some(value),
            _ => None,
        }
    })
}

/// Keyword rules over free text; never fails
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicTextJudgment;

impl HeuristicTextJudgment {
    pub fn derive(&self, text: &str) -> FeedbackRecord {
        let lower = text.to_lowercase();
        let has = |words: &[&str]| words.iter().any(|w| lower.contains(w));

        let rating = if has(&["excellent", "amazing"]) {
            9
        } else if has(&["good", "nice"]) {
            8
        } else if has(&["poor", "bad"]) {
            4
        } else if has(&["terrible"]) {
            2
        } else {
            FALLBACK_RATING
        };

        let mut suggestions = Vec::new();
        if has(&["volume"]) {
            suggestions.push(Suggestion::new(
                "volume_adjust",
                json!({ "gain_db": 1.0 }),
                "Volume adjustment needed based on feedback",
            ));
        }
        if has(&["fade", "transition"]) {
            suggestions.push(Suggestion::new(
                "crossfade",
                json!({ "duration_ms": 4000 }),
                "Improve transitions based on feedback",
            ));
        }

        FeedbackRecord {
            overall_rating: rating,
            matches_request: has(&["yes", "match"]),
            feedback: text.to_string(),
            specific_issues: Vec::new(),
            suggestions,
            energy_flow: TEXT_MODE_NOTE.to_string(),
            transition_quality: TEXT_MODE_NOTE.to_string(),
            technical_issues: Vec::new(),
            creative_suggestions: Vec::new(),
        }
    }
}

impl FeedbackStrategy for HeuristicTextJudgment {
    fn name(&self) -> &'static str {
        "heuristic_text"
    }

    fn parse(&self, text: &str) -> Result<FeedbackRecord> {
        Ok(self.derive(text))
    }
}

/// Turn any judgment into a record, falling back from JSON to keywords
pub fn interpret(judgment: &Judgment) -> (FeedbackRecord, &'static str) {
    match judgment {
        Judgment::Structured(record) => (record.clone(), StructuredJudgment.name()),
        Judgment::Text(text) => match StructuredJudgment.parse(text) {
            Ok(record) => (record, StructuredJudgment.name()),
            Err(e) => {
                debug!(error = %e, "structured parse failed, using keyword heuristics");
                (HeuristicTextJudgment.derive(text), HeuristicTextJudgment.name())
            }
        },
    }
}

// ============================================================================
// Feedback retrieval
// ============================================================================

/// Result of judging one mix file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackReport {
    pub status: String,
    pub feedback: FeedbackRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
    pub file_analyzed: PathBuf,
    pub strategy: String,
}

/// Judge the mix at `mix_path` against the user's prompt
///
/// # Arguments
/// * `judge` - The judgment capability
/// * `mix_path` - Mix file to rate
/// * `prompt` - The original mix request
/// * `mix_metadata` - Optional metadata shown to the judge
///
/// # Returns
/// The parsed feedback, or `NotFound` when the file does not exist
pub fn get_mix_feedback(
    judge: &dyn MixJudge,
    mix_path: &Path,
    prompt: &str,
    mix_metadata: Option<&Value>,
) -> Result<FeedbackReport> {
    if !mix_path.exists() {
        return Err(MixerError::NotFound {
            path: mix_path.display().to_string(),
        });
    }

    let duration_seconds = match import_audio(mix_path) {
        Ok(audio) => audio.duration_secs(),
        Err(e) => {
            debug!(path = %mix_path.display(), error = %e, "could not read mix duration");
            0.0
        }
    };

    let request = JudgeRequest {
        mix_path: mix_path.to_path_buf(),
        prompt: prompt.to_string(),
        mix_metadata: mix_metadata.cloned(),
        duration_seconds,
    };
    let judgment = judge.judge(&request)?;
    let (feedback, strategy) = interpret(&judgment);
    info!(
        path = %mix_path.display(),
        rating = feedback.overall_rating,
        strategy,
        "mix judged"
    );

    let raw_response = match judgment {
        Judgment::Text(text) => Some(text),
        Judgment::Structured(_) => None,
    };
    Ok(FeedbackReport {
        status: "success".to_string(),
        feedback,
        raw_response,
        file_analyzed: mix_path.to_path_buf(),
        strategy: strategy.to_string(),
    })
}
