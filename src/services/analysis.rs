//! Audio feature extraction
//!
//! [`FeatureExtractor`] is the seam the orchestrator analyses tracks through.
//! [`BasicFeatureExtractor`] is a self-contained implementation good enough
//! to drive the mix styles: RMS energy, a zero-crossing brightness estimate,
//! flux-autocorrelation tempo, chroma key and energy-based mixing points.

use std::path::{Path, PathBuf};

use rustfft::num_complex::Complex32;
use rustfft::FftPlanner;
use serde::Serialize;
use tracing::{debug, warn};

use crate::engine::{import_audio, AudioBuffer};
use crate::error::{MixerError, Result};
use crate::mix::analysis::{EnergyLevel, MixingMetadata, TrackAnalysis, DEFAULT_TEMPO};

// ============================================================================
// Constants
// ============================================================================

/// RMS frame length in samples
const FRAME_LENGTH: usize = 2048;

/// Hop between RMS frames in samples
const HOP_LENGTH: usize = 512;

/// Moving-average width used to smooth the RMS envelope
const SMOOTHING_FRAMES: usize = 10;

/// Envelope rises below this fraction of the peak are not onsets
const ONSET_FLOOR: f32 = 0.01;

const MIN_BPM: f64 = 60.0;
const MAX_BPM: f64 = 180.0;

const FFT_FRAME_SIZE: usize = 4096;

/// Analyse every n-th FFT frame
const FFT_STEP: usize = 4;
const MIN_KEY_FREQ: f32 = 55.0;
const MAX_KEY_FREQ: f32 = 5000.0;

const PITCH_CLASSES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

// Krumhansl-Schmuckler key profiles
const MAJOR_PROFILE: [f32; 12] = [
    6.35, 2.23, 3.48, 2.33, 4.38, 4.09, 2.52, 5.19, 2.39, 3.66, 2.29, 2.88,
];
const MINOR_PROFILE: [f32; 12] = [
    6.33, 2.68, 3.52, 5.38, 2.60, 3.53, 2.54, 4.75, 3.98, 2.69, 3.34, 3.17,
];

// ============================================================================
// Extractor seam
// ============================================================================

/// Per-file result of a batch analysis
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AnalysisEntry {
    Failed { file_path: String, error: String },
    Analysis(TrackAnalysis),
}

impl AnalysisEntry {
    pub fn analysis(&self) -> Option<&TrackAnalysis> {
        match self {
            AnalysisEntry::Analysis(a) => Some(a),
            AnalysisEntry::Failed { .. } => None,
        }
    }
}

/// Black-box capability producing a [`TrackAnalysis`] for a file
pub trait FeatureExtractor {
    fn analyze(&self, path: &Path) -> Result<TrackAnalysis>;

    /// Analyse each path; failures become per-item error entries
    fn batch_analyze(&self, paths: &[PathBuf]) -> Vec<AnalysisEntry> {
        paths
            .iter()
            .map(|path| {
                debug!(path = %path.display(), "analyzing");
                match self.analyze(path) {
                    Ok(analysis) => AnalysisEntry::Analysis(analysis),
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "analysis failed");
                        AnalysisEntry::Failed {
                            file_path: path.display().to_string(),
                            error: format!("Analysis failed: {}", e),
                        }
                    }
                }
            })
            .collect()
    }
}

// ============================================================================
// Built-in extractor
// ============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct BasicFeatureExtractor;

impl BasicFeatureExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Analyse an in-memory buffer
    pub fn analyze_buffer(&self, audio: &AudioBuffer, file_path: &str) -> TrackAnalysis {
        let mono = mixdown(audio);
        let sample_rate = audio.sample_rate;
        let duration = audio.duration_secs();

        let envelope = rms_envelope(&mono);
        let energy_mean = mean(&envelope);
        let brightness = zero_crossing_brightness(&mono, sample_rate);
        let envelope_rate = sample_rate as f64 / HOP_LENGTH as f64;
        let tempo = detect_tempo(&envelope, envelope_rate).unwrap_or(DEFAULT_TEMPO);
        let estimated_key = detect_key(&mono, sample_rate);

        TrackAnalysis {
            file_path: file_path.to_string(),
            duration: Some(duration),
            tempo: Some(tempo),
            estimated_key,
            energy_level: Some(EnergyLevel::from_rms(energy_mean).as_str().to_string()),
            mood: Some(classify_mood(brightness, energy_mean, tempo).to_string()),
            energy_mean: Some(energy_mean),
            brightness: Some(brightness),
            mixing_metadata: Some(find_mixing_points(&envelope, envelope_rate, duration)),
        }
    }
}

impl FeatureExtractor for BasicFeatureExtractor {
    fn analyze(&self, path: &Path) -> Result<TrackAnalysis> {
        if !path.exists() {
            return Err(MixerError::NotFound {
                path: path.display().to_string(),
            });
        }
        let audio = import_audio(path)?;
        Ok(self.analyze_buffer(&audio, &path.display().to_string()))
    }
}

/// Mood from brightness (Hz), mean energy and tempo
pub fn classify_mood(brightness: f64, energy_mean: f64, tempo: f64) -> &'static str {
    if brightness > 3000.0 && energy_mean > 0.08 {
        "energetic"
    } else if brightness < 1500.0 && energy_mean < 0.06 {
        "calm"
    } else if tempo > 120.0 {
        "upbeat"
    } else {
        "ambient"
    }
}

// ============================================================================
// Feature helpers
// ============================================================================

fn mixdown(audio: &AudioBuffer) -> Vec<f32> {
    let channels = audio.channels().max(1) as f32;
    (0..audio.len())
        .map(|i| {
            audio
                .samples
                .iter()
                .map(|ch| ch[i])
                .sum::<f32>()
                / channels
        })
        .collect()
}

fn mean(values: &[f32]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().map(|&v| v as f64).sum::<f64>() / values.len() as f64
}

/// Framed RMS with [`FRAME_LENGTH`] windows every [`HOP_LENGTH`] samples
fn rms_envelope(mono: &[f32]) -> Vec<f32> {
    if mono.is_empty() {
        return Vec::new();
    }
    if mono.len() < FRAME_LENGTH {
        let sum_sq: f32 = mono.iter().map(|s| s * s).sum();
        return vec![(sum_sq / mono.len() as f32).sqrt()];
    }
    (0..=(mono.len() - FRAME_LENGTH) / HOP_LENGTH)
        .map(|frame| {
            let start = frame * HOP_LENGTH;
            let sum_sq: f32 = mono[start..start + FRAME_LENGTH].iter().map(|s| s * s).sum();
            (sum_sq / FRAME_LENGTH as f32).sqrt()
        })
        .collect()
}

/// Half the zero-crossing rate in Hz, a rough spectral centroid
fn zero_crossing_brightness(mono: &[f32], sample_rate: u32) -> f64 {
    if mono.len() < 2 {
        return 0.0;
    }
    let crossings = mono
        .windows(2)
        .filter(|w| (w[0] >= 0.0) != (w[1] >= 0.0))
        .count();
    crossings as f64 / (mono.len() - 1) as f64 * sample_rate as f64 / 2.0
}

/// Onset-flux autocorrelation over 60-180 BPM
fn detect_tempo(envelope: &[f32], rate: f64) -> Option<f64> {
    let floor = envelope.iter().copied().fold(0.0f32, f32::max) * ONSET_FLOOR;
    let flux: Vec<f32> = envelope
        .windows(2)
        .map(|w| (w[1] - w[0] - floor).max(0.0))
        .collect();

    let min_lag = (rate * 60.0 / MAX_BPM).floor().max(1.0) as usize;
    let max_lag = (rate * 60.0 / MIN_BPM).ceil() as usize;
    if flux.len() <= max_lag * 2 {
        return None;
    }

    let mut best_corr = 0.0f32;
    let mut best_lag = 0usize;
    for lag in min_lag..=max_lag {
        let sum: f32 = (0..flux.len() - lag).map(|i| flux[i] * flux[i + lag]).sum();
        if sum > best_corr {
            best_corr = sum;
            best_lag = lag;
        }
    }

    if best_corr <= 1e-4 || best_lag == 0 {
        return None;
    }
    let bpm = 60.0 / (best_lag as f64 / rate);
    Some((bpm * 100.0).round() / 100.0)
}

/// Pitch-class name of the best matching key profile
fn detect_key(mono: &[f32], sample_rate: u32) -> Option<String> {
    if mono.len() < FFT_FRAME_SIZE {
        return None;
    }

    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(FFT_FRAME_SIZE);
    let mut buffer = vec![Complex32::new(0.0, 0.0); FFT_FRAME_SIZE];
    let window: Vec<f32> = (0..FFT_FRAME_SIZE)
        .map(|i| {
            0.54 - 0.46
                * (2.0 * std::f32::consts::PI * i as f32 / (FFT_FRAME_SIZE - 1) as f32).cos()
        })
        .collect();

    let mut chroma = [0.0f32; 12];
    for chunk in mono.chunks_exact(FFT_FRAME_SIZE).step_by(FFT_STEP) {
        for (slot, (&s, &w)) in buffer.iter_mut().zip(chunk.iter().zip(&window)) {
            *slot = Complex32::new(s * w, 0.0);
        }
        fft.process(&mut buffer);

        for (bin, value) in buffer.iter().enumerate().take(FFT_FRAME_SIZE / 2).skip(1) {
            let hz = bin as f32 * sample_rate as f32 / FFT_FRAME_SIZE as f32;
            if !(MIN_KEY_FREQ..=MAX_KEY_FREQ).contains(&hz) {
                continue;
            }
            let midi = 69.0 + 12.0 * (hz / 440.0).log2();
            let pitch_class = (midi.round() as i32).rem_euclid(12) as usize;
            chroma[pitch_class] += value.norm_sqr();
        }
    }

    let norm = chroma.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 {
        return None;
    }
    chroma.iter_mut().for_each(|x| *x /= norm);

    let mut best_score = 0.0f32;
    let mut best_root = None;
    for root in 0..12 {
        let score = |profile: &[f32; 12]| -> f32 {
            (0..12)
                .map(|i| chroma[i] * profile[(i + 12 - root) % 12])
                .sum()
        };
        let s = score(&MAJOR_PROFILE).max(score(&MINOR_PROFILE));
        if s > best_score {
            best_score = s;
            best_root = Some(root);
        }
    }
    best_root.map(|root| PITCH_CLASSES[root].to_string())
}

/// Intro/outro boundaries from where the smoothed energy crosses 70% of its mean
fn find_mixing_points(envelope: &[f32], rate: f64, duration: f64) -> MixingMetadata {
    let smooth = moving_average(envelope, SMOOTHING_FRAMES);
    let threshold = mean(&smooth) * 0.7;
    let time_of = |frame: usize| frame as f64 / rate;

    let intro_end = smooth
        .iter()
        .enumerate()
        .find(|&(i, &e)| e as f64 > threshold && time_of(i) > 5.0)
        .map(|(i, _)| time_of(i))
        .unwrap_or(10.0);

    let outro_start = (1..smooth.len())
        .rev()
        .find(|&i| (smooth[i] as f64) < threshold && time_of(i) < duration - 5.0)
        .map(time_of)
        .unwrap_or(duration - 15.0);

    MixingMetadata {
        intro_end: intro_end.min(20.0),
        outro_start: outro_start.max(duration - 30.0).max(0.0),
        best_mix_in: (intro_end + 10.0).min(duration * 0.3),
        best_mix_out: (outro_start - 10.0).max(duration * 0.7),
    }
}

/// Centered moving average, edges use the available neighbours
fn moving_average(values: &[f32], width: usize) -> Vec<f32> {
    let half = width / 2;
    (0..values.len())
        .map(|i| {
            let start = i.saturating_sub(half);
            let end = (i + width - half).min(values.len());
            values[start..end].iter().sum::<f32>() / (end - start) as f32
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{export_audio, generate_test_tone, ExportFormat};
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;
    use test_case::test_case;

    const RATE: u32 = 22_050;

    #[test_case(3500.0, 0.09, 100.0, "energetic" ; "bright and loud")]
    #[test_case(1000.0, 0.03, 140.0, "calm" ; "dark and quiet")]
    #[test_case(2000.0, 0.07, 128.0, "upbeat" ; "fast")]
    #[test_case(2000.0, 0.07, 100.0, "ambient" ; "otherwise")]
    fn test_classify_mood(brightness: f64, energy: f64, tempo: f64, expected: &str) {
        assert_eq!(classify_mood(brightness, energy, tempo), expected);
    }

    #[test]
    fn test_sine_features() {
        let tone = generate_test_tone(440.0, 3.0, RATE);
        let analysis = BasicFeatureExtractor.analyze_buffer(&tone, "tone.wav");

        assert_relative_eq!(analysis.duration.unwrap(), 3.0, epsilon = 1e-3);
        assert_eq!(analysis.estimated_key.as_deref(), Some("A"));
        assert_eq!(analysis.energy_level.as_deref(), Some("high"));
        assert_relative_eq!(analysis.energy_mean.unwrap(), 0.7071, epsilon = 0.01);
        assert_relative_eq!(analysis.brightness.unwrap(), 440.0, epsilon = 5.0);
        // Steady tone has no onsets
        assert_eq!(analysis.tempo, Some(DEFAULT_TEMPO));
        assert_eq!(analysis.mood.as_deref(), Some("ambient"));
    }

    #[test]
    fn test_mixing_points_within_track() {
        let tone = generate_test_tone(220.0, 3.0, RATE);
        let analysis = BasicFeatureExtractor.analyze_buffer(&tone, "tone.wav");
        let points = analysis.mixing_metadata.unwrap();
        assert!(points.best_mix_in <= 0.9 + 1e-9);
        assert!(points.best_mix_out >= 2.1 - 1e-9);
        assert!(points.intro_end <= 20.0);
    }

    #[test]
    fn test_click_track_tempo() {
        // One click every 22 envelope frames
        let mut audio = AudioBuffer::new(RATE as usize * 8, crate::engine::ChannelLayout::Mono, RATE);
        let beat = 22 * HOP_LENGTH;
        for start in (0..audio.len()).step_by(beat) {
            for s in audio.samples[0].iter_mut().skip(start).take(1500) {
                *s = 0.8;
            }
        }
        let tempo = detect_tempo(&rms_envelope(&audio.samples[0]), RATE as f64 / HOP_LENGTH as f64)
            .unwrap();
        let expected = 60.0 * RATE as f64 / beat as f64;
        assert!((tempo - expected).abs() < 0.5, "tempo was {}", tempo);
    }

    #[test]
    fn test_silence_has_no_key() {
        assert_eq!(detect_key(&vec![0.0; FFT_FRAME_SIZE * 2], RATE), None);
        assert_eq!(detect_key(&[0.1; 16], RATE), None);
    }

    #[test]
    fn test_batch_reports_per_item_errors() {
        let dir = tempdir().unwrap();
        let good = dir.path().join("good.wav");
        export_audio(&generate_test_tone(330.0, 1.0, RATE), &good, ExportFormat::new(RATE, 16))
            .unwrap();
        let missing = dir.path().join("missing.wav");

        let entries = BasicFeatureExtractor.batch_analyze(&[good.clone(), missing]);
        assert_eq!(entries.len(), 2);
        assert!(entries[0].analysis().is_some());
        match &entries[1] {
            AnalysisEntry::Failed { error, .. } => assert!(error.starts_with("Analysis failed")),
            other => panic!("expected failure, got {:?}", other),
        }
    }
}
