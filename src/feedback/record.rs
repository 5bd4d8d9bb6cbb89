//! Feedback records produced by judging a mix

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Rating used when a judge's rating cannot be read as an integer
pub const FALLBACK_RATING: u8 = 7;

/// A problem the judge pinned to a point in the mix
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpecificIssue {
    #[serde(default, deserialize_with = "deserialize_millis")]
    pub timestamp_ms: u64,
    #[serde(default, deserialize_with = "deserialize_text")]
    pub issue: String,
    #[serde(default, deserialize_with = "deserialize_text")]
    pub severity: String,
}

impl SpecificIssue {
    /// Bare strings become an issue with no timestamp
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::String(issue) => Some(Self {
                issue,
                ..Self::default()
            }),
            other => serde_json::from_value(other).ok(),
        }
    }
}

/// A suggested edit as the judge phrased it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    #[serde(default, deserialize_with = "deserialize_text")]
    pub action: String,
    #[serde(default, deserialize_with = "deserialize_object")]
    pub parameters: Map<String, Value>,
    #[serde(default, deserialize_with = "deserialize_text")]
    pub reason: String,
}

impl Suggestion {
    pub fn new(action: &str, parameters: Value, reason: &str) -> Self {
        Self {
            action: action.to_string(),
            parameters: match parameters {
                Value::Object(map) => map,
                _ => Map::new(),
            },
            reason: reason.to_string(),
        }
    }

    fn number(&self, key: &str) -> Option<f64> {
        match self.parameters.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn millis(&self, key: &str) -> Option<u64> {
        self.number(key).map(|v| v.max(0.0).round() as u64)
    }

    /// Decode into the closed set of edits the loop knows how to apply
    pub fn to_action(&self) -> SuggestedAction {
        match self.action.as_str() {
            "volume_adjust" => SuggestedAction::VolumeAdjust {
                gain_db: self.number("gain_db").unwrap_or(0.0) as f32,
            },
            "trim" => SuggestedAction::Trim {
                start_ms: self.millis("start_ms"),
                end_ms: self.millis("end_ms"),
            },
            "fade_adjustment" => SuggestedAction::FadeAdjustment {
                fade_in_ms: self.millis("fade_in_ms").unwrap_or(0),
                fade_out_ms: self.millis("fade_out_ms").unwrap_or(0),
            },
            other => SuggestedAction::Other {
                name: other.to_string(),
            },
        }
    }
}

/// Edits the improvement loop can apply
#[derive(Debug, Clone, PartialEq)]
pub enum SuggestedAction {
    VolumeAdjust {
        gain_db: f32,
    },
    /// Missing bounds default to the start / end of the mix
    Trim {
        start_ms: Option<u64>,
        end_ms: Option<u64>,
    },
    FadeAdjustment {
        fade_in_ms: u64,
        fade_out_ms: u64,
    },
    /// Reported but never applied (`crossfade`, `eq`, anything unknown)
    Other {
        name: String,
    },
}

/// A judge's verdict on one mix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    #[serde(default = "fallback_rating", deserialize_with = "deserialize_rating")]
    pub overall_rating: u8,
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub matches_request: bool,
    #[serde(default, deserialize_with = "deserialize_text")]
    pub feedback: String,
    #[serde(default, deserialize_with = "deserialize_issues")]
    pub specific_issues: Vec<SpecificIssue>,
    #[serde(default, deserialize_with = "deserialize_items")]
    pub suggestions: Vec<Suggestion>,
    #[serde(default, deserialize_with = "deserialize_text")]
    pub energy_flow: String,
    #[serde(default, deserialize_with = "deserialize_text")]
    pub transition_quality: String,
    #[serde(default, deserialize_with = "deserialize_text_list")]
    pub technical_issues: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_text_list")]
    pub creative_suggestions: Vec<String>,
}

impl FeedbackRecord {
    /// A record with only a rating and summary
    pub fn rated(overall_rating: u8, feedback: &str) -> Self {
        Self {
            overall_rating: clamp_rating(overall_rating as i64),
            matches_request: false,
            feedback: feedback.to_string(),
            specific_issues: Vec::new(),
            suggestions: Vec::new(),
            energy_flow: String::new(),
            transition_quality: String::new(),
            technical_issues: Vec::new(),
            creative_suggestions: Vec::new(),
        }
    }

    pub fn with_suggestion(mut self, suggestion: Suggestion) -> Self {
        self.suggestions.push(suggestion);
        self
    }

    /// Suggestions decoded into applicable edits, in order
    pub fn actions(&self) -> Vec<SuggestedAction> {
        self.suggestions.iter().map(Suggestion::to_action).collect()
    }
}

fn fallback_rating() -> u8 {
    FALLBACK_RATING
}

fn clamp_rating(value: i64) -> u8 {
    value.clamp(1, 10) as u8
}

/// Integers (or integer strings) are clamped to 1..=10; anything else is 7
fn deserialize_rating<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let rating = match &value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
            .map(clamp_rating),
        Value::String(s) => s.trim().parse::<i64>().ok().map(clamp_rating),
        _ => None,
    };
    Ok(rating.unwrap_or(FALLBACK_RATING))
}

// ============================================================================
// Lenient field decoding
// ============================================================================
//
// Judges drift from the requested shape. A field that cannot be read falls
// back to its default, and a list element that cannot be read is dropped, so
// one odd value never discards the rest of the record.

fn value_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

fn deserialize_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(value_text(Value::deserialize(deserializer)?).unwrap_or_default())
}

fn deserialize_text_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items.into_iter().filter_map(value_text).collect(),
        Value::String(s) => vec![s],
        _ => Vec::new(),
    })
}

/// Non-negative milliseconds from an integer, float or numeric string
fn deserialize_millis<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let millis = match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(millis
        .filter(|v| v.is_finite())
        .map(|v| v.max(0.0).round() as u64)
        .unwrap_or(0))
}

fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(b) => b,
        Value::String(s) => matches!(s.trim().to_lowercase().as_str(), "true" | "yes"),
        Value::Number(n) => n.as_f64().map_or(false, |v| v != 0.0),
        _ => false,
    })
}

/// Objects pass through; `null` and any other shape become an empty map
fn deserialize_object<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Object(map) => map,
        _ => Map::new(),
    })
}

fn deserialize_items<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect(),
        _ => Vec::new(),
    })
}

fn deserialize_issues<'de, D>(deserializer: D) -> Result<Vec<SpecificIssue>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items
            .into_iter()
            .filter_map(SpecificIssue::from_value)
            .collect(),
        _ => Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use test_case::test_case;

    fn decode(rating: Value) -> u8 {
        let record: FeedbackRecord =
            serde_json::from_value(json!({ "overall_rating": rating })).unwrap();
        record.overall_rating
    }

    #[test_case(json!(6), 6 ; "integer")]
    #[test_case(json!(14), 10 ; "clamped high")]
    #[test_case(json!(0), 1 ; "clamped low")]
    #[test_case(json!("8"), 8 ; "numeric string")]
    #[test_case(json!(7.9), 7 ; "float truncated")]
    #[test_case(json!("great"), 7 ; "text falls back")]
    #[test_case(json!(null), 7 ; "null falls back")]
    fn test_rating_decode(raw: Value, expected: u8) {
        assert_eq!(decode(raw), expected);
    }

    #[test]
    fn test_missing_fields_default() {
        let record: FeedbackRecord = serde_json::from_str("{}").unwrap();
        assert_eq!(record.overall_rating, FALLBACK_RATING);
        assert!(record.suggestions.is_empty());
        assert!(!record.matches_request);
    }

    #[test]
    fn test_nested_drift_is_tolerated() {
        let record: FeedbackRecord = serde_json::from_value(json!({
            "overall_rating": 5,
            "matches_request": "yes",
            "specific_issues": [
                {"timestamp_ms": 12000.5, "issue": "clipping", "severity": "high"},
                {"timestamp_ms": "3000", "issue": "gap"},
                "muddy low end",
                42
            ],
            "suggestions": [
                {"action": "trim", "parameters": null, "reason": "too long"},
                "raise the volume",
                {"action": "volume_adjust", "parameters": {"gain_db": -2}}
            ],
            "energy_flow": null,
            "technical_issues": ["hiss", {"at": 10}],
            "creative_suggestions": "add a breakdown"
        }))
        .unwrap();

        assert_eq!(record.overall_rating, 5);
        assert!(record.matches_request);
        assert_eq!(
            record.specific_issues,
            vec![
                SpecificIssue {
                    timestamp_ms: 12001,
                    issue: "clipping".to_string(),
                    severity: "high".to_string(),
                },
                SpecificIssue {
                    timestamp_ms: 3000,
                    issue: "gap".to_string(),
                    severity: String::new(),
                },
                SpecificIssue {
                    timestamp_ms: 0,
                    issue: "muddy low end".to_string(),
                    severity: String::new(),
                },
            ]
        );
        assert_eq!(record.suggestions.len(), 2);
        assert_eq!(record.suggestions[0].action, "trim");
        assert!(record.suggestions[0].parameters.is_empty());
        assert_eq!(
            record.actions()[1],
            SuggestedAction::VolumeAdjust { gain_db: -2.0 }
        );
        assert_eq!(record.energy_flow, "");
        assert_eq!(record.technical_issues, vec!["hiss", "{\"at\":10}"]);
        assert_eq!(record.creative_suggestions, vec!["add a breakdown"]);
    }

    #[test]
    fn test_actions_decode() {
        let record = FeedbackRecord::rated(5, "meh")
            .with_suggestion(Suggestion::new("volume_adjust", json!({"gain_db": -1.5}), ""))
            .with_suggestion(Suggestion::new("trim", json!({"start_ms": 500}), ""))
            .with_suggestion(Suggestion::new(
                "fade_adjustment",
                json!({"fade_in_ms": "250", "fade_out_ms": 1000}),
                "",
            ))
            .with_suggestion(Suggestion::new("eq", json!({"band": "low"}), ""));

        assert_eq!(
            record.actions(),
            vec![
                SuggestedAction::VolumeAdjust { gain_db: -1.5 },
                SuggestedAction::Trim {
                    start_ms: Some(500),
                    end_ms: None
                },
                SuggestedAction::FadeAdjustment {
                    fade_in_ms: 250,
                    fade_out_ms: 1000
                },
                SuggestedAction::Other {
                    name: "eq".to_string()
                },
            ]
        );
    }
}
