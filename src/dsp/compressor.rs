//! Compressor effect
//!
//! Feed-forward dynamics processor with linked stereo detection, optional
//! soft knee and one-pole attack/release smoothing. The mix engine runs it
//! over the whole draft (-20 dB, 4:1) and the exporter again when mastering
//! (-20 dB, 2:1).

use serde::{Deserialize, Serialize};

use crate::dsp::effect::Effect;
use crate::engine::buffer::{db_to_linear, linear_to_db};
use crate::engine::AudioBuffer;
use crate::error::{MixerError, Result};

/// Compressor parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressorParams {
    /// Threshold level in dB (-60 to 0 dB)
    pub threshold_db: f32,
    /// Compression ratio (1.0 to 20.0)
    pub ratio: f32,
    /// Attack time in milliseconds (0.1 to 100 ms)
    pub attack_ms: f32,
    /// Release time in milliseconds (10 to 1000 ms)
    pub release_ms: f32,
    /// Knee width in dB (0 = hard knee)
    pub knee_db: f32,
    /// Makeup gain in dB (0 to 24 dB)
    pub makeup_gain_db: f32,
}

impl Default for CompressorParams {
    fn default() -> Self {
        Self {
            threshold_db: -20.0,
            ratio: 4.0,
            attack_ms: 5.0,
            release_ms: 50.0,
            knee_db: 0.0,
            makeup_gain_db: 0.0,
        }
    }
}

impl CompressorParams {
    /// Draft mix settings: -20 dB, 4:1, 5 ms attack, 50 ms release
    pub fn mix_bus() -> Self {
        Self::default()
    }

    /// Gentler mastering settings: -20 dB, 2:1
    pub fn mastering() -> Self {
        Self {
            ratio: 2.0,
            ..Self::default()
        }
    }

    /// Validate parameters against their ranges
    pub fn validate(&self) -> Result<()> {
        let checks: [(&str, f32, f32, f32, &str); 6] = [
            ("threshold_db", self.threshold_db, -60.0, 0.0, "-60 to 0 dB"),
            ("ratio", self.ratio, 1.0, 20.0, "1.0 to 20.0"),
            ("attack_ms", self.attack_ms, 0.1, 100.0, "0.1 to 100 ms"),
            ("release_ms", self.release_ms, 10.0, 1000.0, "10 to 1000 ms"),
            ("knee_db", self.knee_db, 0.0, 12.0, "0 to 12 dB"),
            ("makeup_gain_db", self.makeup_gain_db, 0.0, 24.0, "0 to 24 dB"),
        ];
        for (param, value, min, max, expected) in checks {
            if value < min || value > max {
                return Err(MixerError::InvalidParameter {
                    param: param.to_string(),
                    value: value.to_string(),
                    expected: expected.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Clamp parameters to valid ranges
    pub fn clamp(&mut self) {
        self.threshold_db = self.threshold_db.clamp(-60.0, 0.0);
        self.ratio = self.ratio.clamp(1.0, 20.0);
        self.attack_ms = self.attack_ms.clamp(0.1, 100.0);
        self.release_ms = self.release_ms.clamp(10.0, 1000.0);
        self.knee_db = self.knee_db.clamp(0.0, 12.0);
        self.makeup_gain_db = self.makeup_gain_db.clamp(0.0, 24.0);
    }
}

/// Compressor dynamics processor
#[derive(Debug, Clone)]
pub struct Compressor {
    params: CompressorParams,
    sample_rate: f32,
    attack_coeff: f32,
    release_coeff: f32,
    /// Current smoothed gain (linear, shared across linked channels)
    gain: f32,
}

impl Compressor {
    pub fn new() -> Self {
        Self::with_params(CompressorParams::default())
    }

    /// Create a compressor with custom parameters (clamped)
    pub fn with_params(params: CompressorParams) -> Self {
        let mut comp = Self {
            params,
            sample_rate: 44_100.0,
            attack_coeff: 0.0,
            release_coeff: 0.0,
            gain: 1.0,
        };
        comp.params.clamp();
        comp.update_coefficients();
        comp
    }

    pub fn params(&self) -> &CompressorParams {
        &self.params
    }

    /// Current gain reduction in dB for metering
    pub fn gain_reduction_db(&self) -> f32 {
        linear_to_db(self.gain).max(-96.0)
    }

    /// One-pole coefficients: exp(-1 / time_in_samples)
    fn update_coefficients(&mut self) {
        let attack_samples = (self.params.attack_ms / 1000.0) * self.sample_rate;
        let release_samples = (self.params.release_ms / 1000.0) * self.sample_rate;

        self.attack_coeff = if attack_samples > 0.0 {
            (-1.0 / attack_samples).exp()
        } else {
            0.0
        };
        self.release_coeff = if release_samples > 0.0 {
            (-1.0 / release_samples).exp()
        } else {
            0.0
        };
    }

    /// Gain reduction in dB (<= 0) for a given input level in dB
    fn compute_gain_reduction_db(&self, input_db: f32) -> f32 {
        let threshold = self.params.threshold_db;
        let ratio = self.params.ratio;
        let knee = self.params.knee_db;

        if knee > 0.0 {
            let knee_start = threshold - knee / 2.0;
            let knee_end = threshold + knee / 2.0;

            if input_db <= knee_start {
                0.0
            } else if input_db >= knee_end {
                (threshold + (input_db - threshold) / ratio) - input_db
            } else {
                // Quadratic interpolation from 1:1 to the full ratio
                let knee_factor = (input_db - knee_start) / knee;
                let effective_ratio = 1.0 + (ratio - 1.0) * knee_factor * knee_factor;
                (knee_start + (input_db - knee_start) / effective_ratio) - input_db
            }
        } else if input_db <= threshold {
            0.0
        } else {
            (threshold + (input_db - threshold) / ratio) - input_db
        }
    }
}

impl Default for Compressor {
    fn default() -> Self {
        Self::new()
    }
}

impl Effect for Compressor {
    fn process(&mut self, buffer: &mut AudioBuffer) {
        let num_channels = buffer.channels();
        let makeup_linear = db_to_linear(self.params.makeup_gain_db);

        for frame in 0..buffer.len() {
            // Linked detection: loudest channel drives the gain
            let level = (0..num_channels)
                .filter_map(|ch| buffer.get_sample(ch, frame))
                .fold(0.0_f32, |acc, s| acc.max(s.abs()));

            let target = db_to_linear(self.compute_gain_reduction_db(linear_to_db(level)));

            let coeff = if target < self.gain {
                self.attack_coeff
            } else {
                self.release_coeff
            };
            self.gain = coeff * self.gain + (1.0 - coeff) * target;

            let total_gain = self.gain * makeup_linear;
            for ch in 0..num_channels {
                buffer.channel_mut(ch)[frame] *= total_gain;
            }
        }
    }

    fn prepare(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate as f32;
        self.update_coefficients();
    }

    fn reset(&mut self) {
        self.gain = 1.0;
    }
}

/// Compress a whole buffer in place with the given settings
pub fn compress_dynamic_range(buffer: &mut AudioBuffer, params: CompressorParams) {
    Compressor::with_params(params).run(buffer);
}

// ============================================================================
// Tests
// ============================================================================
