//! Reconstruction script
//!
//! A declarative record of every step that produced a mix: which sources
//! were loaded (and how they were coloured), the transition and trim
//! operations in order, and the final processing. Serialises to JSON and
//! renders to a readable text form.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

/// One loaded source track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptSource {
    pub file_name: String,
    pub normalize_headroom_db: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tone: Option<String>,
}

/// A single operation; `track` indexes [`MixScript::sources`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ScriptOp {
    Start {
        track: usize,
    },
    Trim {
        track: usize,
        start_ms: u64,
        end_ms: u64,
    },
    Gain {
        track: usize,
        gain_db: f32,
    },
    FadeIn {
        duration_ms: u64,
    },
    Crossfade {
        track: usize,
        duration_ms: u64,
    },
    BeatMatch {
        track: usize,
        target_bpm: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tail_rate: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        incoming_rate: Option<f64>,
    },
    Concatenate {
        track: usize,
        fade_out_ms: u64,
        fade_in_ms: u64,
    },
    FadeOut {
        duration_ms: u64,
    },
    Truncate {
        duration_ms: u64,
        fade_out_ms: u64,
    },
    Normalize {
        headroom_db: f32,
    },
    Compress {
        threshold_db: f32,
        ratio: f32,
        attack_ms: f32,
        release_ms: f32,
    },
}

/// Full reconstruction script of a mix
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MixScript {
    pub mix_style: String,
    pub transition_type: String,
    pub sources: Vec<ScriptSource>,
    pub steps: Vec<ScriptOp>,
    pub final_processing: Vec<ScriptOp>,
}

impl MixScript {
    pub fn new(mix_style: &str, transition_type: &str) -> Self {
        Self {
            mix_style: mix_style.to_string(),
            transition_type: transition_type.to_string(),
            ..Self::default()
        }
    }

    /// Human-readable rendering, one operation per line
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "# mix: style={} transition={} tracks={}",
            self.mix_style,
            self.transition_type,
            self.sources.len()
        );
        for (i, source) in self.sources.iter().enumerate() {
            let _ = write!(
                out,
                "track_{} = load(\"{}\") | normalize({} dB)",
                i, source.file_name, source.normalize_headroom_db
            );
            if let Some(tone) = &source.tone {
                let _ = write!(out, " | tone({})", tone);
            }
            out.push('\n');
        }
        out.push('\n');
        for op in self.steps.iter().chain(self.final_processing.iter()) {
            let _ = writeln!(out, "{}", render_op(op));
        }
        let _ = writeln!(out, "export(mixed, \"final_mix.wav\")");
        out
    }
}

fn render_op(op: &ScriptOp) -> String {
    match op {
        ScriptOp::Start { track } => format!("mixed = track_{}", track),
        ScriptOp::Trim {
            track,
            start_ms,
            end_ms,
        } => format!("track_{} = track_{}[{}:{}]", track, track, start_ms, end_ms),
        ScriptOp::Gain { track, gain_db } => {
            format!("track_{} = gain(track_{}, {:+} dB)", track, track, gain_db)
        }
        ScriptOp::FadeIn { duration_ms } => format!("mixed = fade_in(mixed, {} ms)", duration_ms),
        ScriptOp::Crossfade { track, duration_ms } => {
            format!("mixed = crossfade(mixed, track_{}, {} ms)", track, duration_ms)
        }
        ScriptOp::BeatMatch {
            track,
            target_bpm,
            tail_rate,
            incoming_rate,
        } => {
            let rate = |r: &Option<f64>| match r {
                Some(r) => format!("{:.3}", r),
                None => "unchanged".to_string(),
            };
            format!(
                "beat_match(mixed[-30s], track_{}, target {:.2} BPM, rates {} / {})",
                track,
                target_bpm,
                rate(tail_rate),
                rate(incoming_rate)
            )
        }
        ScriptOp::Concatenate {
            track,
            fade_out_ms,
            fade_in_ms,
        } => format!(
            "mixed = fade_out(mixed, {} ms) + fade_in(track_{}, {} ms)",
            fade_out_ms, track, fade_in_ms
        ),
        ScriptOp::FadeOut { duration_ms } => {
            format!("mixed = fade_out(mixed, {} ms)", duration_ms)
        }
        ScriptOp::Truncate {
            duration_ms,
            fade_out_ms,
        } => format!(
            "mixed = fade_out(mixed[:{}], {} ms)",
            duration_ms, fade_out_ms
        ),
        ScriptOp::Normalize { headroom_db } => {
            format!("mixed = normalize(mixed, {} dB)", headroom_db)
        }
        ScriptOp::Compress {
            threshold_db,
            ratio,
            attack_ms,
            release_ms,
        } => format!(
            "mixed = compress(mixed, {} dB, {}:1, attack {} ms, release {} ms)",
            threshold_db, ratio, attack_ms, release_ms
        ),
    }
}
