//! Mix styles
//!
//! A style decides the order of the segments, any per-segment preparation,
//! and which transitions run between them.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::dsp::{Effect, Gain, ToneShape};
use crate::engine::AudioBuffer;
use crate::mix::analysis::TrackAnalysis;
use crate::mix::script::{MixScript, ScriptOp, ScriptSource};
use crate::mix::transition::{
    combine, crossfade, Pairing, TransitionPolicy, TransitionType,
};

/// Lift applied to every track by the energetic style
pub const ENERGETIC_GAIN_DB: f32 = 2.0;

/// How the segment sequence is arranged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MixStyle {
    /// Input order, every join uses the requested transition
    Seamless,
    /// Quiet to loud, trimmed to mix points, short crossfades
    Energetic,
    /// Faded in, joined, faded out
    Basic,
}

impl MixStyle {
    /// Parse a style name; anything unrecognised is basic
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "seamless" => MixStyle::Seamless,
            "energetic" => MixStyle::Energetic,
            _ => MixStyle::Basic,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MixStyle::Seamless => "seamless",
            MixStyle::Energetic => "energetic",
            MixStyle::Basic => "basic",
        }
    }
}

/// A loaded, prepared track waiting to be mixed
#[derive(Debug, Clone)]
pub struct MixSegment {
    pub audio: AudioBuffer,
    pub analysis: TrackAnalysis,
    pub source: PathBuf,
    /// Coloration already applied while loading
    pub tone: Option<ToneShape>,
    /// Headroom of the peak normalisation applied while loading
    pub headroom_db: f32,
}

/// Result of arranging segments into one buffer
#[derive(Debug, Clone)]
pub struct Assembly {
    pub audio: AudioBuffer,
    /// Analyses in mix order
    pub analyses: Vec<TrackAnalysis>,
    /// Source paths in mix order
    pub sources: Vec<PathBuf>,
    pub script: MixScript,
}

/// Arrange `segments` into a single buffer
pub fn assemble(
    mut segments: Vec<MixSegment>,
    style: MixStyle,
    policy: TransitionPolicy,
) -> Assembly {
    if style == MixStyle::Energetic {
        // Stable: equal energies keep their input order
        segments.sort_by(|a, b| {
            a.analysis
                .energy_or_zero()
                .total_cmp(&b.analysis.energy_or_zero())
        });
    }

    let mut script = MixScript::new(style.as_str(), policy.kind.as_str());
    script.sources = segments
        .iter()
        .map(|seg| ScriptSource {
            file_name: seg
                .source
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| seg.source.display().to_string()),
            normalize_headroom_db: seg.headroom_db,
            tone: seg.tone.map(|t| t.name().to_string()),
        })
        .collect();
    let analyses: Vec<TrackAnalysis> = segments.iter().map(|s| s.analysis.clone()).collect();
    let sources: Vec<PathBuf> = segments.iter().map(|s| s.source.clone()).collect();
    let sample_rate = segments
        .first()
        .map(|s| s.audio.sample_rate)
        .unwrap_or(crate::engine::buffer::DEFAULT_SAMPLE_RATE);
    let audios: Vec<AudioBuffer> = segments.into_iter().map(|s| s.audio).collect();

    let (audio, steps) = if audios.is_empty() {
        (AudioBuffer::empty(crate::engine::ChannelLayout::Stereo, sample_rate), Vec::new())
    } else {
        match style {
            MixStyle::Seamless => seamless(audios, &analyses, &policy),
            MixStyle::Energetic => energetic(audios, &analyses, policy.fade_ms),
            MixStyle::Basic => basic(audios, &policy),
        }
    };
    script.steps = steps;

    Assembly {
        audio,
        analyses,
        sources,
        script,
    }
}

fn seamless(
    audios: Vec<AudioBuffer>,
    analyses: &[TrackAnalysis],
    policy: &TransitionPolicy,
) -> (AudioBuffer, Vec<ScriptOp>) {
    let mut iter = audios.into_iter().enumerate();
    let first = match iter.next() {
        Some((_, audio)) => audio,
        None => return (AudioBuffer::default(), Vec::new()),
    };

    iter.fold(
        (first, vec![ScriptOp::Start { track: 0 }]),
        |(acc, mut steps), (track, next)| {
            let pairing = Pairing {
                track,
                prev_tempo: analyses[track - 1].tempo_or_default(),
                next_tempo: analyses[track].tempo_or_default(),
            };
            let (mixed, ops) = combine(acc, next, policy, pairing);
            steps.extend(ops);
            (mixed, steps)
        },
    )
}

fn energetic(
    audios: Vec<AudioBuffer>,
    analyses: &[TrackAnalysis],
    fade_ms: u64,
) -> (AudioBuffer, Vec<ScriptOp>) {
    let short_fade = fade_ms / 2;
    let mut steps = Vec::new();
    let mut mixed: Option<AudioBuffer> = None;

    for (track, mut audio) in audios.into_iter().enumerate() {
        if let Some(meta) = &analyses[track].mixing_metadata {
            if let Some((start_ms, end_ms)) = meta.mix_window_ms(audio.duration_ms()) {
                audio = audio.slice_ms(start_ms, end_ms);
                steps.push(ScriptOp::Trim {
                    track,
                    start_ms,
                    end_ms,
                });
            }
        }

        Gain::new(ENERGETIC_GAIN_DB).run(&mut audio);
        steps.push(ScriptOp::Gain {
            track,
            gain_db: ENERGETIC_GAIN_DB,
        });

        mixed = Some(match mixed {
            None => {
                audio.fade_in(short_fade);
                steps.push(ScriptOp::Start { track });
                steps.push(ScriptOp::FadeIn {
                    duration_ms: short_fade,
                });
                audio
            }
            Some(acc) => {
                let (joined, d) = crossfade(acc, audio, short_fade);
                steps.push(ScriptOp::Crossfade {
                    track,
                    duration_ms: d,
                });
                joined
            }
        });
    }

    (mixed.unwrap_or_default(), steps)
}

fn basic(audios: Vec<AudioBuffer>, policy: &TransitionPolicy) -> (AudioBuffer, Vec<ScriptOp>) {
    let fade = policy.fade_ms;
    let mut steps = Vec::new();
    let mut mixed: Option<AudioBuffer> = None;

    for (track, mut audio) in audios.into_iter().enumerate() {
        mixed = Some(match mixed {
            None => {
                audio.fade_in(fade);
                steps.push(ScriptOp::Start { track });
                steps.push(ScriptOp::FadeIn { duration_ms: fade });
                audio
            }
            Some(acc) if policy.kind == TransitionType::Crossfade => {
                let (joined, d) = crossfade(acc, audio, fade);
                steps.push(ScriptOp::Crossfade {
                    track,
                    duration_ms: d,
                });
                joined
            }
            Some(mut acc) => {
                audio.fade_in(fade / 2);
                acc.append(&audio);
                steps.push(ScriptOp::Concatenate {
                    track,
                    fade_out_ms: 0,
                    fade_in_ms: fade / 2,
                });
                acc
            }
        });
    }

    let mut mixed = mixed.unwrap_or_default();
    mixed.fade_out(fade);
    steps.push(ScriptOp::FadeOut { duration_ms: fade });
    (mixed, steps)
}
