//! Mixforge - AI-directed royalty-free music mixing
//!
//! Mixforge turns a natural-language request into a finished mix:
//! 1. Mix Assembly Engine - Composes analysed tracks with transition and style policies
//! 2. Feedback-Improvement Loop - An external judge rates the mix, suggested edits are applied
//! 3. Orchestration Controller - A reasoning service drives discovery, analysis, mixing and export
//!
//! # Architecture
//!
//! External capabilities sit behind traits so each stage can run against
//! scripted stand-ins:
//! - `ReasoningService`: chooses the next operations
//! - `MixJudge`: rates a mix
//! - `TrackDiscovery` / `FeatureExtractor`: find and describe tracks

pub mod agent;
pub mod cli;
pub mod config;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod feedback;
pub mod mix;
pub mod services;

pub use config::MixerConfig;
pub use error::{MixerError, Result};
