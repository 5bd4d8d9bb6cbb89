//! Transition policies
//!
//! A mix is built as a left fold: `combine(acc, next, policy)` consumes the
//! mix so far and the incoming segment and returns the new mix, plus the
//! script operations that describe what was done.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine::AudioBuffer;
use crate::mix::script::ScriptOp;

// ============================================================================
// Constants
// ============================================================================

/// How much of the running mix is re-timed before a beat-matched transition
pub const BEAT_MATCH_TAIL_MS: u64 = 30_000;

/// Slowest playback-rate change beat matching will apply
pub const MIN_TEMPO_RATIO: f64 = 0.9;

/// Fastest playback-rate change beat matching will apply
pub const MAX_TEMPO_RATIO: f64 = 1.1;

// ============================================================================
// Transition Type
// ============================================================================

/// How consecutive segments are joined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionType {
    /// Overlapping fade-out / fade-in
    Crossfade,
    /// Tempo-align the two sides, then crossfade
    BeatMatch,
    /// Half-length fades and a hard join
    Simple,
}

impl TransitionType {
    /// Parse a transition name; anything unrecognised joins simply
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "crossfade" => TransitionType::Crossfade,
            "beat_match" | "beatmatch" => TransitionType::BeatMatch,
            _ => TransitionType::Simple,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionType::Crossfade => "crossfade",
            TransitionType::BeatMatch => "beat_match",
            TransitionType::Simple => "simple",
        }
    }
}

/// Transition kind plus its nominal fade length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionPolicy {
    pub kind: TransitionType,
    pub fade_ms: u64,
}

impl TransitionPolicy {
    pub fn new(kind: TransitionType, fade_ms: u64) -> Self {
        Self { kind, fade_ms }
    }
}

/// Where the incoming segment sits and the tempos on either side of the join
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pairing {
    /// Index of the incoming segment in the mix order
    pub track: usize,
    /// Tempo of the previous segment
    pub prev_tempo: f64,
    /// Tempo of the incoming segment
    pub next_tempo: f64,
}

// ============================================================================
// Crossfade
// ============================================================================

/// Effective crossfade length: never longer than either side
#[inline]
pub fn crossfade_duration(acc_ms: u64, next_ms: u64, fade_ms: u64) -> u64 {
    acc_ms.min(next_ms).min(fade_ms)
}

/// Crossfade `next` onto the end of `acc`
///
/// # Returns
/// The joined audio (length `acc + next - d`) and the overlap `d` in ms
pub fn crossfade(mut acc: AudioBuffer, mut next: AudioBuffer, fade_ms: u64) -> (AudioBuffer, u64) {
    let d = crossfade_duration(acc.duration_ms(), next.duration_ms(), fade_ms);
    acc.fade_out(d);
    next.fade_in(d);
    let position = acc.duration_ms().saturating_sub(d);
    acc.overlay(&next, position);
    (acc, d)
}

// ============================================================================
// Beat Matching
// ============================================================================

/// Playback-rate ratio bringing `bpm` to `target` (1.0 for non-positive tempos)
#[inline]
pub fn tempo_ratio(target: f64, bpm: f64) -> f64 {
    if bpm > 0.0 {
        target / bpm
    } else {
        1.0
    }
}

/// The ratio if it lies within the allowed window; out-of-range ratios are dropped
#[inline]
pub fn applicable_ratio(ratio: f64) -> Option<f64> {
    (MIN_TEMPO_RATIO..=MAX_TEMPO_RATIO)
        .contains(&ratio)
        .then_some(ratio)
}

/// What beat matching actually did
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BeatMatch {
    pub target_bpm: f64,
    /// Rate applied to the outgoing side, if within range
    pub tail_rate: Option<f64>,
    /// Rate applied to the incoming side, if within range
    pub incoming_rate: Option<f64>,
}

/// Re-time two segments toward a common tempo
///
/// `target_bpm` defaults to the mean of the two tempos. A side whose ratio
/// falls outside [0.9, 1.1] is returned unchanged.
pub fn beat_match(
    prev: AudioBuffer,
    next: AudioBuffer,
    prev_bpm: f64,
    next_bpm: f64,
    target_bpm: Option<f64>,
) -> (AudioBuffer, AudioBuffer, BeatMatch) {
    let target = target_bpm
        .filter(|t| *t > 0.0)
        .unwrap_or((prev_bpm + next_bpm) / 2.0);

    let tail_rate = applicable_ratio(tempo_ratio(target, prev_bpm));
    let incoming_rate = applicable_ratio(tempo_ratio(target, next_bpm));

    let prev = match tail_rate {
        Some(rate) => prev.change_rate(rate),
        None => prev,
    };
    let next = match incoming_rate {
        Some(rate) => next.change_rate(rate),
        None => next,
    };

    (
        prev,
        next,
        BeatMatch {
            target_bpm: target,
            tail_rate,
            incoming_rate,
        },
    )
}

// ============================================================================
// Fold step
// ============================================================================

/// Join `next` onto `acc` according to `policy`
pub fn combine(
    acc: AudioBuffer,
    next: AudioBuffer,
    policy: &TransitionPolicy,
    pairing: Pairing,
) -> (AudioBuffer, Vec<ScriptOp>) {
    let track = pairing.track;
    match policy.kind {
        TransitionType::Crossfade => {
            let (mixed, d) = crossfade(acc, next, policy.fade_ms);
            (
                mixed,
                vec![ScriptOp::Crossfade {
                    track,
                    duration_ms: d,
                }],
            )
        }
        TransitionType::BeatMatch => {
            let tail = acc.tail_ms(BEAT_MATCH_TAIL_MS);
            let mut head = acc.without_tail_ms(BEAT_MATCH_TAIL_MS);

            let (tail, next, matched) =
                beat_match(tail, next, pairing.prev_tempo, pairing.next_tempo, None);
            debug!(
                track,
                target_bpm = matched.target_bpm,
                tail_rate = ?matched.tail_rate,
                incoming_rate = ?matched.incoming_rate,
                "beat matched"
            );

            head.append(&tail);
            let (mixed, d) = crossfade(head, next, policy.fade_ms);
            (
                mixed,
                vec![
                    ScriptOp::BeatMatch {
                        track,
                        target_bpm: matched.target_bpm,
                        tail_rate: matched.tail_rate,
                        incoming_rate: matched.incoming_rate,
                    },
                    ScriptOp::Crossfade {
                        track,
                        duration_ms: d,
                    },
                ],
            )
        }
        TransitionType::Simple => {
            let half = policy.fade_ms / 2;
            let mut mixed = acc;
            let mut next = next;
            mixed.fade_out(half);
            next.fade_in(half);
            mixed.append(&next);
            (
                mixed,
                vec![ScriptOp::Concatenate {
                    track,
                    fade_out_ms: half,
                    fade_in_ms: half,
                }],
            )
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ChannelLayout;
    use test_case::test_case;

    const SR: u32 = 8_000;

    fn tone(ms: u64) -> AudioBuffer {
        let mut buffer = AudioBuffer::silent(ms, ChannelLayout::Stereo, SR);
        for ch in &mut buffer.samples {
            ch.iter_mut().for_each(|s| *s = 0.5);
        }
        buffer
    }

    #[test_case(5000, 4000, 3000, 3000 ; "fade shortest")]
    #[test_case(5000, 4000, 10_000, 4000 ; "next shortest")]
    #[test_case(1000, 4000, 3000, 1000 ; "acc shortest")]
    #[test_case(5000, 4000, 0, 0 ; "no fade")]
    fn test_crossfade_duration(a: u64, b: u64, fade: u64, expected: u64) {
        assert_eq!(crossfade_duration(a, b, fade), expected);
    }

    #[test]
    fn test_crossfade_length() {
        let (mixed, d) = crossfade(tone(5000), tone(4000), 3000);
        assert_eq!(d, 3000);
        assert_eq!(mixed.duration_ms(), 6000);

        let (mixed, d) = crossfade(tone(5000), tone(4000), 10_000);
        assert_eq!(d, 4000);
        assert_eq!(mixed.duration_ms(), 5000);
    }

    #[test_case(0.95, Some(0.95) ; "inside")]
    #[test_case(0.9, Some(0.9) ; "lower bound")]
    #[test_case(1.1, Some(1.1) ; "upper bound")]
    #[test_case(0.89, None ; "too slow")]
    #[test_case(1.2, None ; "too fast")]
    fn test_applicable_ratio(ratio: f64, expected: Option<f64>) {
        assert_eq!(applicable_ratio(ratio), expected);
    }

    #[test]
    fn test_tempo_ratio_guards_zero() {
        assert_eq!(tempo_ratio(120.0, 0.0), 1.0);
        assert_eq!(tempo_ratio(120.0, -5.0), 1.0);
        assert!((tempo_ratio(90.0, 100.0) - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_beat_match_applies_close_tempos() {
        let (prev, next, matched) = beat_match(tone(10_000), tone(10_000), 85.0, 90.0, None);
        assert!((matched.target_bpm - 87.5).abs() < 1e-9);
        let tail_rate = matched.tail_rate.unwrap();
        let incoming_rate = matched.incoming_rate.unwrap();
        assert!(tail_rate > 1.0 && incoming_rate < 1.0);
        // Faster playback shortens, slower lengthens
        assert!(prev.duration_ms() < 10_000);
        assert!(next.duration_ms() > 10_000);
    }

    #[test]
    fn test_beat_match_drops_distant_tempos() {
        // Mean 110: ratios 1.375 and 0.786, both outside the window
        let (prev, next, matched) = beat_match(tone(2000), tone(3000), 80.0, 140.0, None);
        assert_eq!(matched.tail_rate, None);
        assert_eq!(matched.incoming_rate, None);
        assert_eq!(prev.duration_ms(), 2000);
        assert_eq!(next.duration_ms(), 3000);
    }

    #[test]
    fn test_beat_match_explicit_target() {
        let (_, _, matched) = beat_match(tone(1000), tone(1000), 100.0, 100.0, Some(105.0));
        assert_eq!(matched.target_bpm, 105.0);
        assert_eq!(matched.tail_rate, Some(1.05));
    }

    #[test]
    fn test_combine_simple_concatenates() {
        let policy = TransitionPolicy::new(TransitionType::Simple, 2000);
        let pairing = Pairing {
            track: 1,
            prev_tempo: 120.0,
            next_tempo: 120.0,
        };
        let (mixed, ops) = combine(tone(3000), tone(2000), &policy, pairing);
        assert_eq!(mixed.duration_ms(), 5000);
        assert_eq!(
            ops,
            vec![ScriptOp::Concatenate {
                track: 1,
                fade_out_ms: 1000,
                fade_in_ms: 1000
            }]
        );
    }

    #[test]
    fn test_combine_beat_match_short_mix() {
        // Shorter than the 30 s window: the whole mix is the re-timed tail
        let policy = TransitionPolicy::new(TransitionType::BeatMatch, 1000);
        let pairing = Pairing {
            track: 1,
            prev_tempo: 100.0,
            next_tempo: 100.0,
        };
        let (mixed, ops) = combine(tone(4000), tone(4000), &policy, pairing);
        assert_eq!(mixed.duration_ms(), 7000);
        assert_eq!(ops.len(), 2);
        assert!(matches!(ops[0], ScriptOp::BeatMatch { tail_rate: Some(r), .. } if r == 1.0));
    }

    #[test_case("crossfade", TransitionType::Crossfade)]
    #[test_case("beat_match", TransitionType::BeatMatch)]
    #[test_case("simple", TransitionType::Simple)]
    #[test_case("swirl", TransitionType::Simple)]
    fn test_transition_names(name: &str, expected: TransitionType) {
        assert_eq!(TransitionType::from_name(name), expected);
    }
}
