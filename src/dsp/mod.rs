//! DSP Effects Library
//!
//! Whole-segment signal processing used by the mix engine and exporter.
//! All effects implement the `Effect` trait for uniform processing.

mod compressor;
mod effect;
mod eq;
mod gain;

pub use compressor::{compress_dynamic_range, Compressor, CompressorParams};
pub use effect::Effect;
pub use eq::{FilterType, ToneFilter, ToneShape};
pub use gain::Gain;
