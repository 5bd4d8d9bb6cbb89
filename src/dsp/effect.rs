//! Effect trait definition
//!
//! Base trait for the processors the mix pipeline runs over whole segments.

use crate::engine::AudioBuffer;

/// Base trait for all DSP effects
///
/// Effects process audio buffers in-place.
pub trait Effect: Send + Sync {
    /// Process audio buffer in-place
    fn process(&mut self, buffer: &mut AudioBuffer);

    /// Prepare the effect for a sample rate
    ///
    /// Called before processing whenever the rate may have changed.
    fn prepare(&mut self, sample_rate: u32);

    /// Reset effect state (filter history, envelopes)
    fn reset(&mut self);

    /// Prepare, reset and process in one call
    fn run(&mut self, buffer: &mut AudioBuffer) {
        self.prepare(buffer.sample_rate);
        self.reset();
        self.process(buffer);
    }
}
