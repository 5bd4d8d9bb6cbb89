//! Mix-level metadata reported alongside every draft

use serde::{Deserialize, Serialize};

use crate::mix::analysis::{TrackAnalysis, DEFAULT_TEMPO};

/// Summary of how a mix was put together
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixMetadata {
    pub transition_type: String,
    pub fade_duration_ms: u64,
    pub mix_style: String,
    pub final_bpm: f64,
    pub energy_progression: Vec<String>,
    pub tracks_used: usize,
    pub title: String,
    pub genre: String,
    pub vibe: String,
}

impl MixMetadata {
    /// Describe a mix built from `analyses` (in mix order)
    pub fn describe(
        analyses: &[TrackAnalysis],
        transition_type: &str,
        fade_duration_ms: u64,
        mix_style: &str,
        genre: &str,
        vibe: &str,
    ) -> Self {
        Self {
            transition_type: transition_type.to_string(),
            fade_duration_ms,
            mix_style: mix_style.to_string(),
            final_bpm: estimate_mix_bpm(analyses),
            energy_progression: energy_progression(analyses),
            tracks_used: analyses.len(),
            title: format!("Generated Mix ({} tracks)", analyses.len()),
            genre: genre.to_string(),
            vibe: vibe.to_string(),
        }
    }
}

/// Mean of the tempos present, 120 when none are
pub fn estimate_mix_bpm(analyses: &[TrackAnalysis]) -> f64 {
    let tempos: Vec<f64> = analyses.iter().filter_map(|a| a.tempo).collect();
    if tempos.is_empty() {
        DEFAULT_TEMPO
    } else {
        tempos.iter().sum::<f64>() / tempos.len() as f64
    }
}

/// Per-track energy labels, "medium" where missing
pub fn energy_progression(analyses: &[TrackAnalysis]) -> Vec<String> {
    analyses
        .iter()
        .map(|a| a.energy_label().to_string())
        .collect()
}
