//! The closed set of operations the controller can run
//!
//! Each operation has a wire name, a JSON schema advertised to the
//! reasoning service and a typed argument struct. Invocations are decoded
//! by name; anything unknown or malformed becomes an error value.

use std::sync::OnceLock;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};

use crate::error::{MixerError, Result};
use crate::mix::generator::deserialize_whole_opt;
use crate::mix::MixRequest;
use crate::services::discovery::DiscoveryQuery;
use crate::services::export::{ExportMetadata, ExportOutcome};

pub const MUSIC_DISCOVERY: &str = "music_discovery_tool";
pub const BATCH_AUDIO_ANALYSIS: &str = "batch_audio_analysis_tool";
pub const MIX_GENERATION: &str = "mix_generation_tool";
pub const ITERATIVE_IMPROVEMENT: &str = "iterative_improvement_tool";
pub const FINAL_MIX_EXPORT: &str = "final_mix_export_tool";
pub const CREATE_MIX_PACKAGE: &str = "create_mix_package_tool";

// ============================================================================
// Arguments
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisArgs {
    pub file_paths: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImprovementArgs {
    pub file_path: String,
    pub prompt: String,
    #[serde(default)]
    pub mix_metadata: Option<Value>,
    /// Lowers the configured iteration budget; never raises it
    #[serde(default, deserialize_with = "deserialize_iterations")]
    pub max_iterations: Option<usize>,
}

fn deserialize_iterations<'de, D>(deserializer: D) -> std::result::Result<Option<usize>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(deserialize_whole_opt(deserializer)?.map(|n| usize::try_from(n).unwrap_or(usize::MAX)))
}

fn default_export_format() -> String {
    "wav".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportArgs {
    pub file_path: String,
    pub title: String,
    #[serde(default)]
    pub metadata: ExportMetadata,
    /// Only "wav" is written; other values are reported and ignored
    #[serde(default = "default_export_format")]
    pub export_format: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageArgs {
    pub export_result: ExportOutcome,
    #[serde(default)]
    pub include_source_files: bool,
}

// ============================================================================
// Operation
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    MusicDiscovery(DiscoveryQuery),
    BatchAudioAnalysis(AnalysisArgs),
    MixGeneration(MixRequest),
    IterativeImprovement(ImprovementArgs),
    FinalMixExport(ExportArgs),
    CreateMixPackage(PackageArgs),
}

fn arguments<T: DeserializeOwned>(name: &str, arguments: &Value) -> Result<T> {
    let args = match arguments {
        Value::Null => json!({}),
        other => other.clone(),
    };
    serde_json::from_value(args).map_err(|e| MixerError::InvalidParameter {
        param: format!("{}.arguments", name),
        value: e.to_string(),
        expected: "arguments matching the operation schema".to_string(),
    })
}

impl Operation {
    /// Decode an invocation by name
    pub fn decode(name: &str, args: &Value) -> Result<Self> {
        match name {
            MUSIC_DISCOVERY => Ok(Operation::MusicDiscovery(arguments(name, args)?)),
            BATCH_AUDIO_ANALYSIS => Ok(Operation::BatchAudioAnalysis(arguments(name, args)?)),
            MIX_GENERATION => Ok(Operation::MixGeneration(arguments(name, args)?)),
            ITERATIVE_IMPROVEMENT => Ok(Operation::IterativeImprovement(arguments(name, args)?)),
            FINAL_MIX_EXPORT => Ok(Operation::FinalMixExport(arguments(name, args)?)),
            CREATE_MIX_PACKAGE => Ok(Operation::CreateMixPackage(arguments(name, args)?)),
            other => Err(MixerError::UnknownOperation {
                name: other.to_string(),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Operation::MusicDiscovery(_) => MUSIC_DISCOVERY,
            Operation::BatchAudioAnalysis(_) => BATCH_AUDIO_ANALYSIS,
            Operation::MixGeneration(_) => MIX_GENERATION,
            Operation::IterativeImprovement(_) => ITERATIVE_IMPROVEMENT,
            Operation::FinalMixExport(_) => FINAL_MIX_EXPORT,
            Operation::CreateMixPackage(_) => CREATE_MIX_PACKAGE,
        }
    }
}

// ============================================================================
// Schema table
// ============================================================================

/// An operation as advertised to the reasoning service
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationSchema {
    pub name: &'static str,
    pub description: &'static str,
    /// JSON schema of the arguments object
    pub parameters: Value,
}

impl OperationSchema {
    /// Function-calling tool definition
    pub fn to_tool(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

/// Every operation, in pipeline order
pub fn operation_schemas() -> &'static [OperationSchema] {
    static SCHEMAS: OnceLock<Vec<OperationSchema>> = OnceLock::new();
    SCHEMAS.get_or_init(build_schemas)
}

fn build_schemas() -> Vec<OperationSchema> {
    vec![
        OperationSchema {
            name: MUSIC_DISCOVERY,
            description: "Searches for royalty-free songs using keywords and downloads MP3s",
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "Search query for music (e.g., 'ambient dreamy', 'upbeat electronic')"},
                    "duration_min": {"type": "integer", "description": "Minimum track duration in seconds", "default": 60},
                    "duration_max": {"type": "integer", "description": "Maximum track duration in seconds", "default": 300},
                    "max_tracks": {"type": "integer", "description": "Maximum number of tracks to download", "default": 5}
                },
                "required": ["query"]
            }),
        },
        OperationSchema {
            name: BATCH_AUDIO_ANALYSIS,
            description: "Analyzes multiple music files for tempo, key, mood, and mixing points",
            parameters: json!({
                "type": "object",
                "properties": {
                    "file_paths": {"type": "array", "items": {"type": "string"}, "description": "List of audio file paths to analyze"}
                },
                "required": ["file_paths"]
            }),
        },
        OperationSchema {
            name: MIX_GENERATION,
            description: "Generates a music mix from analyzed tracks with crossfade, beat-matched or simple transitions",
            parameters: json!({
                "type": "object",
                "properties": {
                    "file_paths": {"type": "array", "items": {"type": "string"}, "description": "List of audio files to mix"},
                    "analyses": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "file_path": {"type": "string"},
                                "duration": {"type": "number"},
                                "tempo": {"type": "number"},
                                "estimated_key": {"type": "string"},
                                "energy_level": {"type": "string"},
                                "mood": {"type": "string"},
                                "energy_mean": {"type": "number"},
                                "mixing_metadata": {"type": "object"}
                            }
                        },
                        "description": "Audio analysis results for each file"
                    },
                    "transition_type": {"type": "string", "enum": ["crossfade", "beat_match", "simple"], "default": "crossfade"},
                    "fade_duration_ms": {"type": "integer", "description": "Fade duration in milliseconds", "default": 3000},
                    "mix_style": {"type": "string", "enum": ["seamless", "energetic", "basic"], "default": "seamless"},
                    "target_duration_ms": {"type": "integer", "description": "Target mix duration in milliseconds (optional)"}
                },
                "required": ["file_paths", "analyses"]
            }),
        },
        OperationSchema {
            name: ITERATIVE_IMPROVEMENT,
            description: "Gets AI feedback on a mix and applies improvements iteratively",
            parameters: json!({
                "type": "object",
                "properties": {
                    "file_path": {"type": "string", "description": "Path to the mix file to analyze"},
                    "prompt": {"type": "string", "description": "Original user prompt/request for the mix"},
                    "mix_metadata": {
                        "type": "object",
                        "description": "Metadata about the mix",
                        "properties": {
                            "transition_type": {"type": "string"},
                            "fade_duration_ms": {"type": "integer"},
                            "mix_style": {"type": "string"},
                            "final_bpm": {"type": "number"},
                            "energy_progression": {"type": "array", "items": {"type": "string"}}
                        }
                    },
                    "max_iterations": {"type": "integer", "description": "Maximum improvement iterations", "default": 3}
                },
                "required": ["file_path", "prompt", "mix_metadata"]
            }),
        },
        OperationSchema {
            name: FINAL_MIX_EXPORT,
            description: "Exports the final mix with metadata and proper file organization",
            parameters: json!({
                "type": "object",
                "properties": {
                    "file_path": {"type": "string", "description": "Path to the mix file to export"},
                    "title": {"type": "string", "description": "Title for the mix"},
                    "metadata": {
                        "type": "object",
                        "description": "Mix metadata including BPM, genre, etc.",
                        "properties": {
                            "bpm": {"type": "number"},
                            "genre": {"type": "string"},
                            "vibe": {"type": "string"},
                            "tracks_used": {"type": "integer"},
                            "mix_style": {"type": "string"}
                        }
                    },
                    "export_format": {"type": "string", "enum": ["wav"], "default": "wav"}
                },
                "required": ["file_path", "title", "metadata"]
            }),
        },
        OperationSchema {
            name: CREATE_MIX_PACKAGE,
            description: "Creates a complete package with mix file, report, and script",
            parameters: json!({
                "type": "object",
                "properties": {
                    "export_result": {
                        "type": "object",
                        "description": "Result from final_mix_export_tool",
                        "properties": {
                            "status": {"type": "string"},
                            "export_path": {"type": "string"},
                            "report_path": {"type": "string"},
                            "script_path": {"type": "string"},
                            "metadata": {"type": "object"}
                        }
                    },
                    "include_source_files": {"type": "boolean", "description": "Whether to include source audio files", "default": false}
                },
                "required": ["export_result"]
            }),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test]
    fn test_schema_table_covers_every_operation() {
        let names: Vec<&str> = operation_schemas().iter().map(|s| s.name).collect();
        assert_eq!(
            names,
            vec![
                MUSIC_DISCOVERY,
                BATCH_AUDIO_ANALYSIS,
                MIX_GENERATION,
                ITERATIVE_IMPROVEMENT,
                FINAL_MIX_EXPORT,
                CREATE_MIX_PACKAGE
            ]
        );
        for schema in operation_schemas() {
            assert_eq!(schema.parameters["type"], "object");
            assert_eq!(schema.to_tool()["function"]["name"], schema.name);
        }
    }

    #[test]
    fn test_decode_discovery_with_defaults() {
        let op = Operation::decode(MUSIC_DISCOVERY, &json!({"query": "lofi"})).unwrap();
        assert_eq!(op, Operation::MusicDiscovery(DiscoveryQuery::new("lofi")));
        assert_eq!(op.name(), MUSIC_DISCOVERY);
    }

    #[test]
    fn test_decode_mix_generation() {
        let op = Operation::decode(
            MIX_GENERATION,
            &json!({
                "file_paths": ["a.mp3", "b.mp3"],
                "analyses": [{"file_path": "a.mp3", "tempo": 90}],
                "mix_style": "energetic"
            }),
        )
        .unwrap();
        match op {
            Operation::MixGeneration(request) => {
                assert_eq!(request.file_paths.len(), 2);
                assert_eq!(request.analyses[0].tempo, Some(90.0));
                assert_eq!(request.mix_style, "energetic");
                assert_eq!(request.fade_duration_ms, 3000);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test_case(json!(3000.0), 3000 ; "float")]
    #[test_case(json!("2500"), 2500 ; "numeric string")]
    #[test_case(json!(1499.6), 1500 ; "rounded")]
    #[test_case(json!(null), 3000 ; "null uses default")]
    fn test_decode_fade_leniently(fade: Value, expected: u64) {
        let op = Operation::decode(
            MIX_GENERATION,
            &json!({"file_paths": ["a.mp3"], "fade_duration_ms": fade, "target_duration_ms": 360000.0}),
        )
        .unwrap();
        let Operation::MixGeneration(request) = op else {
            panic!("expected a mix request");
        };
        assert_eq!(request.fade_duration_ms, expected);
        assert_eq!(request.target_duration_ms, Some(360_000));
    }

    #[test_case(json!({"file_paths": ["a.mp3"], "fade_duration_ms": "soon"}) ; "text fade")]
    #[test_case(json!({"file_paths": ["a.mp3"], "fade_duration_ms": -5}) ; "negative fade")]
    fn test_decode_rejects_unreadable_fade(args: Value) {
        let err = Operation::decode(MIX_GENERATION, &args).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_PARAMETER");
    }

    #[test]
    fn test_decode_iterations_from_float() {
        let op = Operation::decode(
            ITERATIVE_IMPROVEMENT,
            &json!({"file_path": "mix.wav", "prompt": "chill", "max_iterations": 2.0}),
        )
        .unwrap();
        let Operation::IterativeImprovement(args) = op else {
            panic!("expected improvement arguments");
        };
        assert_eq!(args.max_iterations, Some(2));
    }

    #[test]
    fn test_unknown_operation() {
        let err = Operation::decode("make_coffee", &json!({})).unwrap_err();
        assert_eq!(err.error_code(), "UNKNOWN_OPERATION");
    }

    #[test_case(MUSIC_DISCOVERY, json!({}) ; "missing query")]
    #[test_case(BATCH_AUDIO_ANALYSIS, json!({"file_paths": "a.mp3"}) ; "wrong type")]
    #[test_case(ITERATIVE_IMPROVEMENT, json!(null) ; "null arguments")]
    #[test_case(FINAL_MIX_EXPORT, json!("not an object") ; "string arguments")]
    fn test_bad_arguments(name: &str, args: Value) {
        let err = Operation::decode(name, &args).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_PARAMETER");
    }
}
