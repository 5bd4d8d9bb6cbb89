//! Audio Engine Module
//!
//! Core audio handling:
//! - Audio buffer management (the mix segment abstraction)
//! - File I/O operations

pub mod buffer;
pub mod io;

pub use buffer::{AudioBuffer, ChannelLayout};
pub use io::{export_audio, generate_test_tone, import_audio, ExportFormat};
