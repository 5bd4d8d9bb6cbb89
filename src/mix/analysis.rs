//! Per-track analysis record
//!
//! Produced by a feature extractor, or handed back by the reasoning service
//! as part of a mix request. Everything except the path is optional because
//! the latter is often partial.

use serde::{Deserialize, Serialize};

/// Tempo assumed when a track has none
pub const DEFAULT_TEMPO: f64 = 120.0;

/// Energy label assumed when a track has none
pub const DEFAULT_ENERGY_LABEL: &str = "medium";

/// Coarse energy classification from mean RMS
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnergyLevel {
    Low,
    Medium,
    High,
}

impl EnergyLevel {
    /// Classify a mean RMS value: > 0.1 high, > 0.05 medium, else low
    pub fn from_rms(energy_mean: f64) -> Self {
        if energy_mean > 0.1 {
            EnergyLevel::High
        } else if energy_mean > 0.05 {
            EnergyLevel::Medium
        } else {
            EnergyLevel::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EnergyLevel::Low => "low",
            EnergyLevel::Medium => "medium",
            EnergyLevel::High => "high",
        }
    }
}

/// Suggested entry and exit points within a track, in seconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MixingMetadata {
    #[serde(default)]
    pub intro_end: f64,
    #[serde(default)]
    pub outro_start: f64,
    #[serde(default)]
    pub best_mix_in: f64,
    #[serde(default)]
    pub best_mix_out: f64,
}

impl MixingMetadata {
    /// `[best_mix_in, best_mix_out)` in ms, clamped to a segment of `len_ms`
    ///
    /// Returns `None` when the clamped window is empty.
    pub fn mix_window_ms(&self, len_ms: u64) -> Option<(u64, u64)> {
        let to_ms = |secs: f64| (secs.max(0.0) * 1000.0).round() as u64;
        let start = to_ms(self.best_mix_in).min(len_ms);
        let end = if self.best_mix_out > 0.0 {
            to_ms(self.best_mix_out).min(len_ms)
        } else {
            len_ms
        };
        (end > start).then_some((start, end))
    }
}

/// Feature summary for one track
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackAnalysis {
    #[serde(default)]
    pub file_path: String,
    /// Seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    /// Beats per minute
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tempo: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_key: Option<String>,
    /// "low", "medium" or "high"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub energy_level: Option<String>,
    /// "calm", "energetic", "upbeat", "ambient" or free text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub energy_mean: Option<f64>,
    /// Spectral centroid estimate in Hz
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brightness: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mixing_metadata: Option<MixingMetadata>,
}

impl TrackAnalysis {
    /// Analysis carrying only a path
    pub fn for_path(path: impl Into<String>) -> Self {
        Self {
            file_path: path.into(),
            ..Self::default()
        }
    }

    /// Tempo, or [`DEFAULT_TEMPO`] when absent
    pub fn tempo_or_default(&self) -> f64 {
        self.tempo.unwrap_or(DEFAULT_TEMPO)
    }

    /// Mean energy, 0 when absent
    pub fn energy_or_zero(&self) -> f64 {
        self.energy_mean.unwrap_or(0.0)
    }

    /// Energy label, "medium" when absent
    pub fn energy_label(&self) -> &str {
        self.energy_level.as_deref().unwrap_or(DEFAULT_ENERGY_LABEL)
    }
}
