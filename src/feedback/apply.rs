//! Applying a judge's suggestions to a mix file

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::dsp::{Effect, Gain};
use crate::engine::buffer::NORMALIZE_HEADROOM_DB;
use crate::engine::{export_audio, import_audio, ExportFormat};
use crate::error::{MixerError, Result};
use crate::feedback::record::{FeedbackRecord, SuggestedAction};

/// A new mix version written from applied suggestions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplyOutcome {
    pub status: String,
    pub output_file: PathBuf,
    pub applied_changes: Vec<String>,
    pub duration_ms: u64,
}

/// Apply the record's suggestions, in order, to a fresh copy of `mix_file`
///
/// Unrecognised actions are skipped. The result is peak-normalised and
/// written to `output_file`; the input file is never modified.
pub fn apply_feedback_suggestions(
    mix_file: &Path,
    record: &FeedbackRecord,
    output_file: &Path,
    format: ExportFormat,
) -> Result<ApplyOutcome> {
    let mut audio = import_audio(mix_file)?;
    let mut applied_changes = Vec::new();

    for action in record.actions() {
        match action {
            SuggestedAction::VolumeAdjust { gain_db } => {
                Gain::new(gain_db).run(&mut audio);
                applied_changes.push(format!("Applied volume adjustment: {}dB", gain_db));
            }
            SuggestedAction::Trim { start_ms, end_ms } => {
                let len_ms = audio.duration_ms();
                let start = start_ms.unwrap_or(0).min(len_ms);
                let end = end_ms.unwrap_or(len_ms).min(len_ms);
                audio = audio.slice_ms(start, end);
                applied_changes.push(format!("Trimmed audio: {}ms to {}ms", start, end));
            }
            SuggestedAction::FadeAdjustment {
                fade_in_ms,
                fade_out_ms,
            } => {
                if fade_in_ms > 0 {
                    audio.fade_in(fade_in_ms);
                }
                if fade_out_ms > 0 {
                    audio.fade_out(fade_out_ms);
                }
                applied_changes.push(format!(
                    "Applied fades: in={}ms, out={}ms",
                    fade_in_ms, fade_out_ms
                ));
            }
            SuggestedAction::Other { name } => {
                debug!(action = %name, "suggestion not applicable, skipped");
            }
        }
    }

    if audio.is_empty() {
        return Err(MixerError::ProcessingError {
            reason: "suggestions left no audio to export".to_string(),
        });
    }

    audio.normalize(NORMALIZE_HEADROOM_DB);
    export_audio(&audio, output_file, format)?;
    info!(
        path = %output_file.display(),
        changes = applied_changes.len(),
        "improved mix written"
    );

    Ok(ApplyOutcome {
        status: "success".to_string(),
        output_file: output_file.to_path_buf(),
        applied_changes,
        duration_ms: audio.duration_ms(),
    })
}
