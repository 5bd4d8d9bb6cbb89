//! Tone filters
//!
//! Biquad low/high-pass filters, plus the mood-driven tone shapes the mix
//! engine applies to each loaded segment.

use std::f64::consts::PI;

use crate::dsp::effect::Effect;
use crate::engine::AudioBuffer;

/// Filter type for a tone filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterType {
    /// Remove above frequency
    LowPass,
    /// Remove below frequency
    HighPass,
}

/// Biquad filter coefficients
/// Transfer function: H(z) = (b0 + b1*z^-1 + b2*z^-2) / (a0 + a1*z^-1 + a2*z^-2)
/// Normalized: all coefficients divided by a0
#[derive(Debug, Clone, Copy, Default)]
struct BiquadCoeffs {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl BiquadCoeffs {
    /// Calculate biquad coefficients using Audio EQ Cookbook formulas
    /// Reference: https://www.w3.org/2011/audio/audio-eq-cookbook.html
    fn calculate(
        filter_type: FilterType,
        sample_rate: f64,
        frequency: f64,
        q: f64,
    ) -> Self {
        // Clamp frequency to valid range (below Nyquist)
        let freq = frequency.clamp(20.0, sample_rate / 2.0 - 1.0);
        let q = q.clamp(0.1, 10.0);

        let w0 = 2.0 * PI * freq / sample_rate;
        let cos_w0 = w0.cos();
        let sin_w0 = w0.sin();
        let alpha = sin_w0 / (2.0 * q);

        let (b0, b1, b2, a0, a1, a2) = match filter_type {
            FilterType::LowPass => (
                (1.0 - cos_w0) / 2.0,
                1.0 - cos_w0,
                (1.0 - cos_w0) / 2.0,
                1.0 + alpha,
                -2.0 * cos_w0,
                1.0 - alpha,
            ),
            FilterType::HighPass => (
                (1.0 + cos_w0) / 2.0,
                -(1.0 + cos_w0),
                (1.0 + cos_w0) / 2.0,
                1.0 + alpha,
                -2.0 * cos_w0,
                1.0 - alpha,
            ),
        };

        BiquadCoeffs {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }
}

/// Biquad filter state for one channel
#[derive(Debug, Clone, Copy, Default)]
struct BiquadState {
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

impl BiquadState {
    /// Direct Form I
    fn process(&mut self, input: f64, coeffs: &BiquadCoeffs) -> f64 {
        let output = coeffs.b0 * input + coeffs.b1 * self.x1 + coeffs.b2 * self.x2
            - coeffs.a1 * self.y1
            - coeffs.a2 * self.y2;

        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = output;

        output
    }
}

// ============================================================================
// Tone Filter
// ============================================================================

/// A single biquad filter applied to every channel
#[derive(Debug, Clone)]
pub struct ToneFilter {
    pub filter_type: FilterType,
    /// Corner frequency in Hz
    pub frequency: f32,
    pub q: f32,
    coeffs: BiquadCoeffs,
    states: Vec<BiquadState>,
}

impl ToneFilter {
    pub fn new(filter_type: FilterType, frequency: f32) -> Self {
        Self {
            filter_type,
            frequency,
            q: std::f32::consts::FRAC_1_SQRT_2,
            coeffs: BiquadCoeffs::default(),
            states: Vec::new(),
        }
    }

    pub fn low_pass(frequency: f32) -> Self {
        Self::new(FilterType::LowPass, frequency)
    }

    pub fn high_pass(frequency: f32) -> Self {
        Self::new(FilterType::HighPass, frequency)
    }
}

impl Effect for ToneFilter {
    fn process(&mut self, buffer: &mut AudioBuffer) {
        if self.states.len() < buffer.channels() {
            self.states.resize(buffer.channels(), BiquadState::default());
        }
        for ch in 0..buffer.channels() {
            let state = &mut self.states[ch];
            for sample in buffer.channel_mut(ch).iter_mut() {
                *sample = state.process(*sample as f64, &self.coeffs) as f32;
            }
        }
    }

    fn prepare(&mut self, sample_rate: u32) {
        self.coeffs = BiquadCoeffs::calculate(
            self.filter_type,
            sample_rate as f64,
            self.frequency as f64,
            self.q as f64,
        );
    }

    fn reset(&mut self) {
        self.states.iter_mut().for_each(|s| *s = BiquadState::default());
    }
}

// ============================================================================
// Mood tone shapes
// ============================================================================

/// Coloration applied to a whole segment before mixing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToneShape {
    /// 8 kHz low-pass, then +1 dB
    Warm,
    /// 3 kHz high-pass summed over the original at -3 dB
    TrebleBoost,
}

impl ToneShape {
    /// Shape for a track mood; moods without one are left untouched
    pub fn for_mood(mood: &str) -> Option<Self> {
        match mood {
            "calm" => Some(ToneShape::Warm),
            "energetic" => Some(ToneShape::TrebleBoost),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ToneShape::Warm => "warm",
            ToneShape::TrebleBoost => "treble_boost",
        }
    }

    /// Return a shaped copy of `audio`
    pub fn apply(&self, audio: &AudioBuffer) -> AudioBuffer {
        match self {
            ToneShape::Warm => {
                let mut shaped = audio.clone();
                ToneFilter::low_pass(8000.0).run(&mut shaped);
                shaped.apply_gain(1.0);
                shaped
            }
            ToneShape::TrebleBoost => treble_boost(audio),
        }
    }
}

/// High band summed over the original attenuated by 3 dB
fn treble_boost(audio: &AudioBuffer) -> AudioBuffer {
    let mut band = audio.clone();
    ToneFilter::high_pass(3000.0).run(&mut band);
    let mut base = audio.clone();
    base.apply_gain(-3.0);
    band.overlay(&base, 0);
    band
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::buffer::db_to_linear;
    use crate::engine::generate_test_tone;

    fn tone_peak(freq: f32, mut filter: ToneFilter) -> f32 {
        let mut tone = generate_test_tone(freq, 0.5, 44_100);
        filter.run(&mut tone);
        // Skip the filter's settling time
        tone.channel(0)[4410..]
            .iter()
            .fold(0.0_f32, |acc, s| acc.max(s.abs()))
    }

    #[test]
    fn test_low_pass_attenuates_highs() {
        assert!(tone_peak(100.0, ToneFilter::low_pass(1000.0)) > 0.9);
        assert!(tone_peak(10_000.0, ToneFilter::low_pass(1000.0)) < 0.05);
    }

    #[test]
    fn test_high_pass_attenuates_lows() {
        assert!(tone_peak(50.0, ToneFilter::high_pass(3000.0)) < 0.01);
        assert!(tone_peak(12_000.0, ToneFilter::high_pass(3000.0)) > 0.9);
    }

    #[test]
    fn test_mood_mapping() {
        assert_eq!(ToneShape::for_mood("calm"), Some(ToneShape::Warm));
        assert_eq!(ToneShape::for_mood("energetic"), Some(ToneShape::TrebleBoost));
        assert_eq!(ToneShape::for_mood("ambient"), None);
        assert_eq!(ToneShape::for_mood("upbeat"), None);
    }

    #[test]
    fn test_warm_lifts_lows_by_one_db() {
        let tone = generate_test_tone(200.0, 0.5, 44_100);
        let warm = ToneShape::Warm.apply(&tone);
        let peak = warm.channel(0)[4410..]
            .iter()
            .fold(0.0_f32, |acc, s| acc.max(s.abs()));
        assert!((peak - db_to_linear(1.0)).abs() < 0.02, "peak {}", peak);
        assert_eq!(warm.len(), tone.len());
    }

    #[test]
    fn test_treble_boost_keeps_length() {
        let tone = generate_test_tone(5000.0, 0.25, 44_100);
        let boosted = ToneShape::TrebleBoost.apply(&tone);
        assert_eq!(boosted.len(), tone.len());
        assert!(boosted.peak() > tone.peak());
    }
}
