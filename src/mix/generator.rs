//! Mix generation
//!
//! Loads the requested tracks, prepares each one, arranges them with the
//! chosen style and transition, finishes the result and writes a draft.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::MixerConfig;
use crate::dsp::{compress_dynamic_range, CompressorParams, ToneShape};
use crate::engine::buffer::NORMALIZE_HEADROOM_DB;
use crate::engine::{export_audio, import_audio, ExportFormat};
use crate::error::{MixerError, Result};
use crate::mix::analysis::TrackAnalysis;
use crate::mix::metadata::MixMetadata;
use crate::mix::script::{MixScript, ScriptOp};
use crate::mix::style::{assemble, Assembly, MixSegment, MixStyle};
use crate::mix::transition::{TransitionPolicy, TransitionType};

/// Fade applied after cutting a mix down to its target length
pub const TRUNCATE_FADE_MS: u64 = 2000;

fn default_transition() -> String {
    "crossfade".to_string()
}

fn default_fade_ms() -> u64 {
    3000
}

fn default_style() -> String {
    "seamless".to_string()
}

/// Non-negative whole number from an integer, float or numeric string
pub(crate) fn whole_number(value: &Value) -> Option<u64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    (n.is_finite() && n >= 0.0).then(|| n.round() as u64)
}

/// `null` means "not given"; anything unreadable is an error
pub(crate) fn deserialize_whole_opt<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(None);
    }
    whole_number(&value)
        .map(Some)
        .ok_or_else(|| de::Error::custom(format!("expected a whole number, got {}", value)))
}

fn deserialize_fade_ms<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(deserialize_whole_opt(deserializer)?.unwrap_or_else(default_fade_ms))
}

/// Everything needed to build one mix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixRequest {
    pub file_paths: Vec<String>,
    /// The i-th analysis describes the i-th path
    #[serde(default)]
    pub analyses: Vec<TrackAnalysis>,
    #[serde(default = "default_transition")]
    pub transition_type: String,
    #[serde(default = "default_fade_ms", deserialize_with = "deserialize_fade_ms")]
    pub fade_duration_ms: u64,
    #[serde(default = "default_style")]
    pub mix_style: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_whole_opt"
    )]
    pub target_duration_ms: Option<u64>,
}

impl MixRequest {
    pub fn new(file_paths: Vec<String>) -> Self {
        Self {
            file_paths,
            analyses: Vec::new(),
            transition_type: default_transition(),
            fade_duration_ms: default_fade_ms(),
            mix_style: default_style(),
            target_duration_ms: None,
        }
    }

    pub fn with_analyses(mut self, analyses: Vec<TrackAnalysis>) -> Self {
        self.analyses = analyses;
        self
    }

    pub fn with_transition(mut self, transition_type: &str) -> Self {
        self.transition_type = transition_type.to_string();
        self
    }

    pub fn with_style(mut self, mix_style: &str) -> Self {
        self.mix_style = mix_style.to_string();
        self
    }

    pub fn with_fade(mut self, fade_duration_ms: u64) -> Self {
        self.fade_duration_ms = fade_duration_ms;
        self
    }

    pub fn with_target_duration(mut self, target_duration_ms: u64) -> Self {
        self.target_duration_ms = Some(target_duration_ms);
        self
    }
}

/// A written draft and how it was made
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixOutcome {
    pub status: String,
    pub draft_path: PathBuf,
    pub duration_ms: u64,
    pub duration_seconds: f64,
    pub tracks_used: usize,
    /// Source tracks in mix order
    pub sources: Vec<PathBuf>,
    pub script: MixScript,
    pub script_text: String,
    pub mix_metadata: MixMetadata,
}

/// Which requested files can be found
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileCheck {
    pub existing_files: Vec<PathBuf>,
    pub missing_files: Vec<String>,
    pub music_dir_contents: Vec<String>,
}

/// Builds draft mixes
#[derive(Debug, Clone)]
pub struct MixGenerator {
    config: MixerConfig,
}

impl MixGenerator {
    pub fn new(config: &MixerConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Find a file: as given, relative to the working directory, then by
    /// name inside the music directory
    pub fn resolve_path(&self, path: &str) -> Option<PathBuf> {
        let cleaned = path.trim().trim_matches('"').trim_matches('\'');
        if cleaned.is_empty() {
            return None;
        }
        let given = PathBuf::from(cleaned);

        let mut candidates = vec![given.clone()];
        if let Ok(cwd) = env::current_dir() {
            candidates.push(cwd.join(&given));
        }
        if let Some(name) = given.file_name() {
            candidates.push(self.config.directories.music_dir.join(name));
        }

        candidates.into_iter().find(|c| c.is_file())
    }

    /// Report which paths exist (resolving through the music directory)
    pub fn check_files_exist(&self, paths: &[String]) -> FileCheck {
        let music_dir_contents = fs::read_dir(&self.config.directories.music_dir)
            .map(|entries| {
                let mut names: Vec<String> = entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .collect();
                names.sort();
                names
            })
            .unwrap_or_default();

        let mut check = FileCheck {
            music_dir_contents,
            ..FileCheck::default()
        };
        for path in paths {
            match self.resolve_path(path) {
                Some(found) if !check.existing_files.contains(&found) => {
                    check.existing_files.push(found)
                }
                Some(_) => {}
                None => check.missing_files.push(path.clone()),
            }
        }
        check
    }

    /// Load one track and prepare it for mixing
    ///
    /// Conforms to the configured format, peak-normalises, then applies
    /// the tone shape for the track's mood.
    pub fn load_segment(&self, path: &str, analysis: TrackAnalysis) -> Result<MixSegment> {
        let resolved = self.resolve_path(path).ok_or_else(|| MixerError::NotFound {
            path: path.to_string(),
        })?;

        let mut audio = import_audio(&resolved)?.conform(
            self.config.audio.sample_rate,
            self.config.audio.channels as usize,
        )?;
        audio.normalize(NORMALIZE_HEADROOM_DB);

        let tone = analysis.mood.as_deref().and_then(ToneShape::for_mood);
        if let Some(shape) = tone {
            audio = shape.apply(&audio);
        }

        debug!(
            path = %resolved.display(),
            duration_ms = audio.duration_ms(),
            tone = ?tone,
            "loaded segment"
        );

        Ok(MixSegment {
            audio,
            analysis,
            source: resolved,
            tone,
            headroom_db: NORMALIZE_HEADROOM_DB,
        })
    }

    /// Effective length limit: the target, capped by the configured maximum
    fn duration_limit_ms(&self, target: Option<u64>) -> Option<u64> {
        let cap = match self.config.mix.max_mix_duration_secs {
            0 => None,
            secs => Some(secs * 1000),
        };
        match (target, cap) {
            (Some(t), Some(c)) => Some(t.min(c)),
            (t, c) => t.or(c),
        }
    }

    /// Build and write a draft mix
    ///
    /// # Errors
    /// * `NoValidInput` - No paths were given, or none of them could be loaded
    /// * `Io` - The draft could not be written
    pub fn generate_mix(&self, request: &MixRequest) -> Result<MixOutcome> {
        if request.file_paths.is_empty() {
            return Err(MixerError::NoValidInput {
                reason: "No files provided".to_string(),
            });
        }

        info!(files = request.file_paths.len(), "starting mix generation");
        let check = self.check_files_exist(&request.file_paths);
        debug!(
            existing = check.existing_files.len(),
            missing = ?check.missing_files,
            music_dir = ?check.music_dir_contents,
            "file check"
        );

        let mut segments = Vec::with_capacity(request.file_paths.len());
        for (i, path) in request.file_paths.iter().enumerate() {
            let analysis = request
                .analyses
                .get(i)
                .cloned()
                .unwrap_or_else(|| TrackAnalysis::for_path(path.as_str()));
            match self.load_segment(path, analysis) {
                Ok(segment) => segments.push(segment),
                Err(e) => warn!(path = %path, error = %e, "skipping track"),
            }
        }

        if segments.is_empty() {
            return Err(MixerError::NoValidInput {
                reason: "No valid audio segments loaded. Check file paths and ensure files exist."
                    .to_string(),
            });
        }
        info!(tracks = segments.len(), "segments loaded");

        let style = MixStyle::from_name(&request.mix_style);
        let policy = TransitionPolicy::new(
            TransitionType::from_name(&request.transition_type),
            request.fade_duration_ms,
        );
        let Assembly {
            mut audio,
            analyses,
            sources,
            mut script,
        } = assemble(segments, style, policy);

        if let Some(limit) = self.duration_limit_ms(request.target_duration_ms) {
            if audio.duration_ms() > limit {
                audio = audio.slice_ms(0, limit);
                audio.fade_out(TRUNCATE_FADE_MS);
                script.final_processing.push(ScriptOp::Truncate {
                    duration_ms: limit,
                    fade_out_ms: TRUNCATE_FADE_MS,
                });
                info!(limit_ms = limit, "trimmed mix to target duration");
            }
        }

        audio.normalize(NORMALIZE_HEADROOM_DB);
        script.final_processing.push(ScriptOp::Normalize {
            headroom_db: NORMALIZE_HEADROOM_DB,
        });

        let params = CompressorParams::mix_bus();
        script.final_processing.push(ScriptOp::Compress {
            threshold_db: params.threshold_db,
            ratio: params.ratio,
            attack_ms: params.attack_ms,
            release_ms: params.release_ms,
        });
        compress_dynamic_range(&mut audio, params);

        let draft_path = self
            .config
            .directories
            .temp_dir
            .join(format!("mix_draft_{}tracks.wav", analyses.len()));
        write_draft(&audio, &draft_path, &self.config)?;

        let mix_metadata = MixMetadata::describe(
            &analyses,
            &request.transition_type,
            request.fade_duration_ms,
            &request.mix_style,
            &self.config.mix.genre,
            &self.config.mix.vibe,
        );

        let duration_ms = audio.duration_ms();
        info!(
            path = %draft_path.display(),
            duration_ms,
            tracks = analyses.len(),
            "mix generated"
        );

        Ok(MixOutcome {
            status: "success".to_string(),
            draft_path,
            duration_ms,
            duration_seconds: duration_ms as f64 / 1000.0,
            tracks_used: analyses.len(),
            sources,
            script_text: script.render(),
            script,
            mix_metadata,
        })
    }
}

/// Write a buffer in the configured output format
pub(crate) fn write_draft(
    audio: &crate::engine::AudioBuffer,
    path: &Path,
    config: &MixerConfig,
) -> Result<()> {
    export_audio(
        audio,
        path,
        ExportFormat::new(config.audio.sample_rate, config.audio.bit_depth),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::generate_test_tone;
    use tempfile::tempdir;

    fn write_tone(dir: &Path, name: &str, secs: f32) -> PathBuf {
        let path = dir.join(name);
        let tone = generate_test_tone(220.0, secs, 8_000);
        export_audio(&tone, &path, ExportFormat::new(8_000, 16)).unwrap();
        path
    }

    fn generator(root: &Path) -> MixGenerator {
        let mut config = MixerConfig::rooted_at(root);
        config.audio.sample_rate = 8_000;
        config.ensure_directories().unwrap();
        MixGenerator::new(&config)
    }

    #[test]
    fn test_empty_request() {
        let dir = tempdir().unwrap();
        let result = generator(dir.path()).generate_mix(&MixRequest::new(vec![]));
        match result {
            Err(MixerError::NoValidInput { reason }) => assert_eq!(reason, "No files provided"),
            other => panic!("expected NoValidInput, got {:?}", other),
        }
    }

    #[test]
    fn test_all_missing() {
        let dir = tempdir().unwrap();
        let request = MixRequest::new(vec!["nope.mp3".to_string(), "gone.wav".to_string()]);
        let result = generator(dir.path()).generate_mix(&request);
        assert!(matches!(result, Err(MixerError::NoValidInput { .. })));
    }

    #[test]
    fn test_resolves_through_music_dir() {
        let dir = tempdir().unwrap();
        let gen = generator(dir.path());
        let music = dir.path().join("music");
        write_tone(&music, "found.wav", 0.5);

        let resolved = gen.resolve_path("/somewhere/else/found.wav").unwrap();
        assert_eq!(resolved, music.join("found.wav"));
        assert!(gen.resolve_path("\"/somewhere/else/lost.wav\"").is_none());

        let check = gen.check_files_exist(&[
            "/elsewhere/found.wav".to_string(),
            "lost.wav".to_string(),
        ]);
        assert_eq!(check.existing_files, vec![music.join("found.wav")]);
        assert_eq!(check.missing_files, vec!["lost.wav".to_string()]);
        assert_eq!(check.music_dir_contents, vec!["found.wav".to_string()]);
    }

    #[test]
    fn test_skips_missing_and_writes_draft() {
        let dir = tempdir().unwrap();
        let gen = generator(dir.path());
        let a = write_tone(dir.path(), "a.wav", 2.0);
        let b = write_tone(dir.path(), "b.wav", 2.0);

        let request = MixRequest::new(vec![
            a.display().to_string(),
            "missing.wav".to_string(),
            b.display().to_string(),
        ])
        .with_fade(1000);
        let outcome = gen.generate_mix(&request).unwrap();

        assert_eq!(outcome.tracks_used, 2);
        assert_eq!(outcome.duration_ms, 3000);
        assert!(outcome.draft_path.ends_with("mix_draft_2tracks.wav"));
        assert!(outcome.draft_path.exists());
        assert_eq!(outcome.mix_metadata.title, "Generated Mix (2 tracks)");
        assert!(outcome.script_text.contains("a.wav"));
    }

    #[test]
    fn test_target_duration_truncates() {
        let dir = tempdir().unwrap();
        let gen = generator(dir.path());
        let a = write_tone(dir.path(), "a.wav", 3.0);
        let b = write_tone(dir.path(), "b.wav", 3.0);

        let request = MixRequest::new(vec![a.display().to_string(), b.display().to_string()])
            .with_fade(1000)
            .with_target_duration(4000);
        let outcome = gen.generate_mix(&request).unwrap();

        assert_eq!(outcome.duration_ms, 4000);
        assert!(outcome.script.final_processing.contains(&ScriptOp::Truncate {
            duration_ms: 4000,
            fade_out_ms: TRUNCATE_FADE_MS
        }));
    }

    #[test]
    fn test_request_defaults_from_json() {
        let request: MixRequest =
            serde_json::from_str(r#"{"file_paths": ["a.mp3"]}"#).unwrap();
        assert_eq!(request.transition_type, "crossfade");
        assert_eq!(request.fade_duration_ms, 3000);
        assert_eq!(request.mix_style, "seamless");
        assert_eq!(request.target_duration_ms, None);
    }
}
