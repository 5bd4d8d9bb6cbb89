//! Audio Buffer Management
//!
//! The segment abstraction every mix step works on. Buffers are
//! non-interleaved 32-bit float and addressed in milliseconds for the
//! mix-level operations (slice, fade, overlay), the way a DJ thinks about
//! a track rather than the way a DSP block does.

use crate::error::{MixerError, Result};

// ============================================================================
// Constants
// ============================================================================

/// Sample rate used when nothing else is configured
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// Gain used as the silent end of a fade ramp
const FADE_FLOOR_DB: f32 = -120.0;

/// Default headroom kept by peak normalisation
pub const NORMALIZE_HEADROOM_DB: f32 = 0.1;

// ============================================================================
// Helper Functions
// ============================================================================

/// Convert decibels to linear amplitude
#[inline]
pub fn db_to_linear(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// Convert linear amplitude to decibels
///
/// Returns -f32::INFINITY for zero input.
#[inline]
pub fn linear_to_db(linear: f32) -> f32 {
    if linear <= 0.0 {
        f32::NEG_INFINITY
    } else {
        20.0 * linear.log10()
    }
}

/// Calculate the RMS level of an audio buffer in dB
///
/// Returns -f32::INFINITY for empty or silent buffers.
pub fn calculate_rms(buffer: &AudioBuffer) -> f32 {
    linear_to_db(buffer.rms())
}

/// Calculate the peak level of an audio buffer in dB
///
/// Returns -f32::INFINITY for empty buffers.
pub fn calculate_peak(buffer: &AudioBuffer) -> f32 {
    linear_to_db(buffer.peak())
}

/// Linear interpolation resampling by `ratio` (target length / source length)
pub(crate) fn resample_linear(samples: &[f32], ratio: f64) -> Vec<f32> {
    if samples.is_empty() || ratio <= 0.0 {
        return Vec::new();
    }

    let source_len = samples.len();
    let target_len = ((source_len as f64) * ratio).round().max(1.0) as usize;
    let mut output = Vec::with_capacity(target_len);

    for i in 0..target_len {
        let src_pos = i as f64 / ratio;
        let src_idx = src_pos.floor() as usize;
        let frac = (src_pos - src_idx as f64) as f32;

        let sample = if src_idx + 1 < source_len {
            samples[src_idx] * (1.0 - frac) + samples[src_idx + 1] * frac
        } else if src_idx < source_len {
            samples[src_idx]
        } else {
            samples[source_len - 1]
        };

        output.push(sample);
    }

    output
}

// ============================================================================
// Channel Layout
// ============================================================================

/// Audio channel configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelLayout {
    Mono,
    Stereo,
}

impl ChannelLayout {
    /// Number of channels for this layout
    pub fn num_channels(&self) -> usize {
        match self {
            ChannelLayout::Mono => 1,
            ChannelLayout::Stereo => 2,
        }
    }

    /// Layout for a channel count, if supported
    pub fn from_count(count: usize) -> Option<Self> {
        match count {
            1 => Some(ChannelLayout::Mono),
            2 => Some(ChannelLayout::Stereo),
            _ => None,
        }
    }
}

// ============================================================================
// Audio Buffer
// ============================================================================

/// An owned, decoded audio segment
///
/// Every mix step consumes its inputs and returns a new buffer, so a
/// composed mix is a fold over owned values rather than a shared mutable
/// accumulator.
///
/// # Example
/// ```
/// use mixforge::engine::buffer::{AudioBuffer, ChannelLayout};
///
/// let buffer = AudioBuffer::new(44_100, ChannelLayout::Stereo, 44_100);
/// assert_eq!(buffer.channels(), 2);
/// assert_eq!(buffer.duration_ms(), 1000);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    /// Sample data: outer Vec is channels, inner Vec is samples
    pub samples: Vec<Vec<f32>>,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

impl AudioBuffer {
    /// Create a silent buffer with the given number of samples per channel
    pub fn new(num_samples: usize, layout: ChannelLayout, sample_rate: u32) -> Self {
        Self {
            samples: vec![vec![0.0_f32; num_samples]; layout.num_channels()],
            sample_rate,
        }
    }

    /// Create a silent buffer lasting `duration_ms`
    pub fn silent(duration_ms: u64, layout: ChannelLayout, sample_rate: u32) -> Self {
        let num_samples = ms_to_samples(duration_ms, sample_rate);
        Self::new(num_samples, layout, sample_rate)
    }

    /// Create an empty buffer (zero samples) with the given shape
    pub fn empty(layout: ChannelLayout, sample_rate: u32) -> Self {
        Self::new(0, layout, sample_rate)
    }

    /// Create an audio buffer from interleaved sample data
    pub fn from_interleaved(
        interleaved: &[f32],
        layout: ChannelLayout,
        sample_rate: u32,
    ) -> Result<Self> {
        let num_channels = layout.num_channels();

        if interleaved.len() % num_channels != 0 {
            return Err(MixerError::InvalidAudio {
                reason: format!(
                    "Interleaved data length {} is not divisible by channel count {}",
                    interleaved.len(),
                    num_channels
                ),
                source: None,
            });
        }

        let num_samples = interleaved.len() / num_channels;
        let mut samples = vec![Vec::with_capacity(num_samples); num_channels];

        for frame in interleaved.chunks_exact(num_channels) {
            for (ch, &sample) in frame.iter().enumerate() {
                samples[ch].push(sample);
            }
        }

        Ok(Self {
            samples,
            sample_rate,
        })
    }

    /// Convert the buffer to interleaved format (L, R, L, R, ...)
    pub fn to_interleaved(&self) -> Vec<f32> {
        let num_channels = self.channels();
        let num_samples = self.len();
        let mut interleaved = Vec::with_capacity(num_channels * num_samples);

        for sample_idx in 0..num_samples {
            for channel in &self.samples {
                interleaved.push(channel[sample_idx]);
            }
        }

        interleaved
    }

    /// Get the number of channels
    #[inline]
    pub fn channels(&self) -> usize {
        self.samples.len()
    }

    /// Get the number of samples per channel
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.first().map(|ch| ch.len()).unwrap_or(0)
    }

    /// Check if the buffer holds no samples
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Duration in seconds
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.len() as f64 / self.sample_rate as f64
    }

    /// Duration in whole milliseconds (rounded)
    pub fn duration_ms(&self) -> u64 {
        (self.duration_secs() * 1000.0).round() as u64
    }

    /// Sample index corresponding to a millisecond offset, clamped to the buffer
    pub fn ms_to_index(&self, ms: u64) -> usize {
        ms_to_samples(ms, self.sample_rate).min(self.len())
    }

    /// Channel layout, if the channel count is supported
    pub fn channel_layout(&self) -> Option<ChannelLayout> {
        ChannelLayout::from_count(self.channels())
    }

    /// Immutable access to a channel's samples
    ///
    /// # Panics
    /// Panics if the channel index is out of bounds
    #[inline]
    pub fn channel(&self, index: usize) -> &[f32] {
        &self.samples[index]
    }

    /// Mutable access to a channel's samples
    ///
    /// # Panics
    /// Panics if the channel index is out of bounds
    #[inline]
    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        &mut self.samples[index]
    }

    /// Get a sample, or None if out of bounds
    #[inline]
    pub fn get_sample(&self, channel: usize, index: usize) -> Option<f32> {
        self.samples
            .get(channel)
            .and_then(|ch| ch.get(index).copied())
    }

    /// Copy of the `[start_ms, end_ms)` window; bounds are clamped
    pub fn slice_ms(&self, start_ms: u64, end_ms: u64) -> AudioBuffer {
        let start = self.ms_to_index(start_ms);
        let end = self.ms_to_index(end_ms).max(start);
        self.slice_samples(start, end)
    }

    /// Copy of the last `ms` milliseconds (the whole buffer if shorter)
    pub fn tail_ms(&self, ms: u64) -> AudioBuffer {
        let keep = self.ms_to_index(ms);
        self.slice_samples(self.len() - keep, self.len())
    }

    /// Copy of everything except the last `ms` milliseconds
    pub fn without_tail_ms(&self, ms: u64) -> AudioBuffer {
        let keep = self.ms_to_index(ms);
        self.slice_samples(0, self.len() - keep)
    }

    fn slice_samples(&self, start: usize, end: usize) -> AudioBuffer {
        AudioBuffer {
            samples: self
                .samples
                .iter()
                .map(|ch| ch[start..end].to_vec())
                .collect(),
            sample_rate: self.sample_rate,
        }
    }

    /// Ramp the first `duration_ms` up from silence
    pub fn fade_in(&mut self, duration_ms: u64) {
        let n = self.ms_to_index(duration_ms);
        if n == 0 {
            return;
        }
        let floor = db_to_linear(FADE_FLOOR_DB);
        for channel in &mut self.samples {
            for (i, sample) in channel.iter_mut().take(n).enumerate() {
                let t = i as f32 / n as f32;
                *sample *= floor + (1.0 - floor) * t;
            }
        }
    }

    /// Ramp the last `duration_ms` down to silence
    pub fn fade_out(&mut self, duration_ms: u64) {
        let n = self.ms_to_index(duration_ms);
        if n == 0 {
            return;
        }
        let floor = db_to_linear(FADE_FLOOR_DB);
        let start = self.len() - n;
        for channel in &mut self.samples {
            for (i, sample) in channel.iter_mut().skip(start).enumerate() {
                let t = (i + 1) as f32 / n as f32;
                *sample *= 1.0 + (floor - 1.0) * t;
            }
        }
    }

    /// Sum `other` into this buffer starting at `position_ms`
    ///
    /// The buffer grows if `other` runs past its end, so overlapping tails
    /// keep the rest of the incoming segment.
    pub fn overlay(&mut self, other: &AudioBuffer, position_ms: u64) {
        let offset = self.ms_to_index(position_ms);
        let needed = offset + other.len();
        if needed > self.len() {
            for channel in &mut self.samples {
                channel.resize(needed, 0.0);
            }
        }
        for (ch, channel) in self.samples.iter_mut().enumerate() {
            let source = &other.samples[ch.min(other.channels().saturating_sub(1))];
            for (i, &sample) in source.iter().enumerate() {
                channel[offset + i] += sample;
            }
        }
    }

    /// Concatenate `other` after this buffer
    pub fn append(&mut self, other: &AudioBuffer) {
        for (ch, channel) in self.samples.iter_mut().enumerate() {
            let source = &other.samples[ch.min(other.channels().saturating_sub(1))];
            channel.extend_from_slice(source);
        }
    }

    /// Apply gain to all samples
    pub fn apply_gain(&mut self, gain_db: f32) {
        let gain_linear = db_to_linear(gain_db);
        for channel in &mut self.samples {
            for sample in channel.iter_mut() {
                *sample *= gain_linear;
            }
        }
    }

    /// Absolute peak sample value (linear)
    pub fn peak(&self) -> f32 {
        self.samples
            .iter()
            .flat_map(|ch| ch.iter())
            .fold(0.0_f32, |acc, s| acc.max(s.abs()))
    }

    /// RMS over all channels (linear)
    pub fn rms(&self) -> f32 {
        let count = self.channels() * self.len();
        if count == 0 {
            return 0.0;
        }
        let sum_sq: f64 = self
            .samples
            .iter()
            .flat_map(|ch| ch.iter())
            .map(|&s| (s as f64) * (s as f64))
            .sum();
        (sum_sq / count as f64).sqrt() as f32
    }

    /// Peak-normalise so the loudest sample sits `headroom_db` below full scale
    ///
    /// Silent buffers are left untouched.
    pub fn normalize(&mut self, headroom_db: f32) {
        let peak = self.peak();
        if peak <= 0.0 {
            return;
        }
        let target = db_to_linear(-headroom_db);
        let gain = target / peak;
        for channel in &mut self.samples {
            for sample in channel.iter_mut() {
                *sample *= gain;
            }
        }
    }

    /// Play the segment back `ratio` times faster (tempo and pitch move together)
    ///
    /// The result lasts `len / ratio` samples at the same sample rate.
    pub fn change_rate(&self, ratio: f64) -> AudioBuffer {
        if ratio <= 0.0 || (ratio - 1.0).abs() < f64::EPSILON {
            return self.clone();
        }
        AudioBuffer {
            samples: self
                .samples
                .iter()
                .map(|ch| resample_linear(ch, 1.0 / ratio))
                .collect(),
            sample_rate: self.sample_rate,
        }
    }

    /// Convert to the given sample rate and channel count
    pub fn conform(self, sample_rate: u32, channels: usize) -> Result<AudioBuffer> {
        if ChannelLayout::from_count(channels).is_none() {
            return Err(MixerError::UnsupportedFormat {
                format: format!("{}-channel audio (only mono/stereo supported)", channels),
            });
        }

        let mut buffer = if self.sample_rate != sample_rate && self.sample_rate > 0 {
            let ratio = sample_rate as f64 / self.sample_rate as f64;
            AudioBuffer {
                samples: self
                    .samples
                    .iter()
                    .map(|ch| resample_linear(ch, ratio))
                    .collect(),
                sample_rate,
            }
        } else {
            self
        };

        match (buffer.channels(), channels) {
            (from, to) if from == to => {}
            (1, 2) => {
                let mono = buffer.samples[0].clone();
                buffer.samples.push(mono);
            }
            (2, 1) => {
                let right = buffer.samples.pop().unwrap_or_default();
                for (l, r) in buffer.samples[0].iter_mut().zip(right.iter()) {
                    *l = (*l + r) * 0.5;
                }
            }
            (from, _) => {
                let frames = buffer.len();
                let mut down = vec![0.0_f32; frames];
                for ch in &buffer.samples {
                    for (acc, s) in down.iter_mut().zip(ch.iter()) {
                        *acc += s / from as f32;
                    }
                }
                buffer.samples = vec![down; channels];
            }
        }

        Ok(buffer)
    }
}

impl Default for AudioBuffer {
    fn default() -> Self {
        Self::empty(ChannelLayout::Stereo, DEFAULT_SAMPLE_RATE)
    }
}

/// Number of samples covering `ms` at `sample_rate`
#[inline]
pub fn ms_to_samples(ms: u64, sample_rate: u32) -> usize {
    ((ms as f64) * sample_rate as f64 / 1000.0).round() as usize
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const SR: u32 = 1000;

    fn constant(value: f32, ms: u64) -> AudioBuffer {
        let mut buffer = AudioBuffer::silent(ms, ChannelLayout::Stereo, SR);
        for ch in &mut buffer.samples {
            ch.iter_mut().for_each(|s| *s = value);
        }
        buffer
    }

    #[test]
    fn test_db_to_linear() {
        assert_relative_eq!(db_to_linear(0.0), 1.0, epsilon = 1e-6);
        assert_relative_eq!(db_to_linear(-6.0206), 0.5, epsilon = 1e-4);
    }

    #[test]
    fn test_linear_to_db_zero() {
        assert_eq!(linear_to_db(0.0), f32::NEG_INFINITY);
    }

    #[test]
    fn test_duration_ms() {
        let buffer = AudioBuffer::silent(2500, ChannelLayout::Mono, 44_100);
        assert_eq!(buffer.duration_ms(), 2500);
    }

    #[test]
    fn test_slice_clamps() {
        let buffer = constant(0.5, 1000);
        assert_eq!(buffer.slice_ms(200, 700).duration_ms(), 500);
        assert_eq!(buffer.slice_ms(800, 5000).duration_ms(), 200);
        assert!(buffer.slice_ms(900, 100).is_empty());
    }

    #[test]
    fn test_tail_split() {
        let buffer = constant(0.5, 1000);
        assert_eq!(buffer.tail_ms(300).duration_ms(), 300);
        assert_eq!(buffer.without_tail_ms(300).duration_ms(), 700);
        assert_eq!(buffer.tail_ms(5000).duration_ms(), 1000);
        assert!(buffer.without_tail_ms(5000).is_empty());
    }

    #[test]
    fn test_fade_in_ramps_from_silence() {
        let mut buffer = constant(1.0, 1000);
        buffer.fade_in(100);
        assert!(buffer.channel(0)[0] < 1e-5);
        assert!(buffer.channel(0)[50] > 0.4 && buffer.channel(0)[50] < 0.6);
        assert_relative_eq!(buffer.channel(0)[500], 1.0);
    }

    #[test]
    fn test_fade_out_ends_silent() {
        let mut buffer = constant(1.0, 1000);
        buffer.fade_out(100);
        assert!(buffer.channel(1)[999] < 1e-5);
        assert_relative_eq!(buffer.channel(1)[899], 1.0);
    }

    #[test]
    fn test_overlay_extends() {
        let mut base = constant(0.25, 1000);
        let other = constant(0.25, 500);
        base.overlay(&other, 800);
        assert_eq!(base.duration_ms(), 1300);
        assert_relative_eq!(base.channel(0)[900], 0.5);
        assert_relative_eq!(base.channel(0)[1200], 0.25);
        assert_relative_eq!(base.channel(0)[100], 0.25);
    }

    #[test]
    fn test_append() {
        let mut a = constant(0.1, 400);
        a.append(&constant(0.2, 600));
        assert_eq!(a.duration_ms(), 1000);
        assert_relative_eq!(a.channel(0)[500], 0.2);
    }

    #[test]
    fn test_normalize_peak() {
        let mut buffer = constant(0.25, 100);
        buffer.normalize(NORMALIZE_HEADROOM_DB);
        assert_relative_eq!(buffer.peak(), db_to_linear(-0.1), epsilon = 1e-6);
    }

    #[test]
    fn test_normalize_silence_is_noop() {
        let mut buffer = AudioBuffer::silent(100, ChannelLayout::Mono, SR);
        buffer.normalize(0.1);
        assert!(buffer.channel(0).iter().all(|s| s.is_finite()));
        assert_eq!(buffer.peak(), 0.0);
    }

    #[test]
    fn test_change_rate_shortens() {
        let buffer = constant(0.5, 1000);
        let faster = buffer.change_rate(1.05);
        let expected = (1000.0 / 1.05_f64).round() as u64;
        assert!((faster.duration_ms() as i64 - expected as i64).abs() <= 1);
    }

    #[test]
    fn test_conform_mono_to_stereo_and_rate() {
        let mono = AudioBuffer::silent(1000, ChannelLayout::Mono, 22_050);
        let conformed = mono.conform(44_100, 2).unwrap();
        assert_eq!(conformed.channels(), 2);
        assert_eq!(conformed.sample_rate, 44_100);
        assert_eq!(conformed.duration_ms(), 1000);
    }

    #[test]
    fn test_conform_rejects_surround() {
        let buffer = AudioBuffer::silent(10, ChannelLayout::Stereo, SR);
        assert!(buffer.conform(SR, 6).is_err());
    }

    #[test]
    fn test_interleave_roundtrip() {
        let buffer =
            AudioBuffer::from_interleaved(&[1.0, 5.0, 2.0, 6.0], ChannelLayout::Stereo, SR)
                .unwrap();
        assert_eq!(buffer.channel(0), &[1.0, 2.0]);
        assert_eq!(buffer.to_interleaved(), vec![1.0, 5.0, 2.0, 6.0]);
    }

    #[test]
    fn test_rms_and_peak_db() {
        let buffer = constant(0.5, 100);
        assert_relative_eq!(calculate_peak(&buffer), -6.0206, epsilon = 1e-3);
        assert_relative_eq!(calculate_rms(&buffer), -6.0206, epsilon = 1e-3);
    }
}
