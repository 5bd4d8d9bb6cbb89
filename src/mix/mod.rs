//! Mix Assembly Engine
//!
//! Composes an ordered sequence of tracks into one mix:
//! - Per-track analysis records
//! - Transition policies, folded pairwise over the sequence
//! - Style policies (ordering, trimming, fades)
//! - Draft generation with a reconstruction script

pub mod analysis;
pub mod generator;
pub mod metadata;
pub mod script;
pub mod style;
pub mod transition;

pub use analysis::{EnergyLevel, MixingMetadata, TrackAnalysis};
pub use generator::{FileCheck, MixGenerator, MixOutcome, MixRequest};
pub use metadata::MixMetadata;
pub use script::{MixScript, ScriptOp};
pub use style::{MixSegment, MixStyle};
pub use transition::{TransitionPolicy, TransitionType};
