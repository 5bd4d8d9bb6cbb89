//! Final export and packaging
//!
//! Masters a finished mix, writes it to the exports directory together with
//! a JSON report and the reconstruction script, and bundles everything into
//! a package directory on request.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Datelike, Local};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::config::MixerConfig;
use crate::dsp::{compress_dynamic_range, CompressorParams};
use crate::engine::buffer::{calculate_peak, calculate_rms, NORMALIZE_HEADROOM_DB};
use crate::engine::{export_audio, import_audio, AudioBuffer, ExportFormat};
use crate::error::{MixerError, Result};

/// Mastered peaks never exceed this level
pub const PEAK_CEILING_DB: f32 = -1.0;

/// Mixes at most this long get no edge fades
const EDGE_FADE_MIN_LENGTH_MS: u64 = 10_000;
const EDGE_PROBE_MS: u64 = 1000;
const EDGE_FADE_IN_MS: u64 = 500;
const EDGE_FADE_OUT_MS: u64 = 1000;

/// An edge quieter than the mix by this much already counts as faded
const FADED_EDGE_DB: f32 = 6.0;

const TOOL_VERSION: &str = concat!("Mixforge v", env!("CARGO_PKG_VERSION"));

// ============================================================================
// Types
// ============================================================================

/// Descriptive metadata attached to an export
///
/// Unknown keys are kept and written to the report untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bpm: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vibe: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracks_used: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mix_style: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    /// Rendered reconstruction script
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Result of [`Exporter::export_final_mix`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportOutcome {
    #[serde(default)]
    pub status: String,
    pub export_path: PathBuf,
    #[serde(default)]
    pub report_path: Option<PathBuf>,
    #[serde(default)]
    pub script_path: Option<PathBuf>,
    #[serde(default)]
    pub file_size_bytes: u64,
    #[serde(default)]
    pub file_size_mb: f64,
    #[serde(default)]
    pub duration_seconds: f64,
    #[serde(default)]
    pub format: String,
    #[serde(default)]
    pub metadata: ExportMetadata,
    #[serde(default)]
    pub checksum: String,
}

/// Result of [`Exporter::create_mix_package`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageOutcome {
    pub status: String,
    pub package_path: PathBuf,
    /// Paths relative to the package directory, sorted
    pub files_included: Vec<String>,
}

// ============================================================================
// Helpers
// ============================================================================

/// Keep alphanumerics, spaces, `-` and `_`; trailing spaces are dropped
pub fn safe_title(title: &str) -> String {
    let kept: String = title
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect();
    let trimmed = kept.trim_end();
    if trimmed.is_empty() {
        "mix".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Hex SHA-256 of a file's contents
pub fn sha256_file(path: &Path) -> Result<String> {
    let bytes = fs::read(path)?;
    Ok(format!("{:x}", Sha256::digest(&bytes)))
}

/// Final mastering pass
///
/// Normalise, compress gently (2:1 at -20 dB), hold peaks at -1 dBFS and,
/// for mixes longer than 10 s, fade edges that are not already quiet.
pub fn master(audio: &mut AudioBuffer) {
    audio.normalize(NORMALIZE_HEADROOM_DB);
    compress_dynamic_range(audio, CompressorParams::mastering());

    let peak_db = calculate_peak(audio);
    if peak_db > PEAK_CEILING_DB {
        audio.apply_gain(PEAK_CEILING_DB - peak_db);
    }

    if audio.duration_ms() > EDGE_FADE_MIN_LENGTH_MS {
        let overall = calculate_rms(audio);
        let start_level = calculate_rms(&audio.slice_ms(0, EDGE_PROBE_MS));
        let end_level = calculate_rms(&audio.tail_ms(EDGE_PROBE_MS));

        if start_level > overall - FADED_EDGE_DB {
            audio.fade_in(EDGE_FADE_IN_MS);
        }
        if end_level > overall - FADED_EDGE_DB {
            audio.fade_out(EDGE_FADE_OUT_MS);
        }
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "mix".to_string())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

// ============================================================================
// Exporter
// ============================================================================

pub struct Exporter {
    exports_dir: PathBuf,
    format: ExportFormat,
    channels: u16,
}

impl Exporter {
    pub fn new(config: &MixerConfig) -> Self {
        Self {
            exports_dir: config.directories.exports_dir.clone(),
            format: ExportFormat::new(config.audio.sample_rate, config.audio.bit_depth),
            channels: config.audio.channels,
        }
    }

    /// Master `file_path` and write it, a report and its script to the exports directory
    ///
    /// # Arguments
    /// * `file_path` - Mix to export
    /// * `title` - Mix title, used for the file name
    /// * `metadata` - Descriptive metadata for the report
    pub fn export_final_mix(
        &self,
        file_path: &Path,
        title: &str,
        metadata: &ExportMetadata,
    ) -> Result<ExportOutcome> {
        if !file_path.exists() {
            return Err(MixerError::NotFound {
                path: file_path.display().to_string(),
            });
        }
        fs::create_dir_all(&self.exports_dir)?;

        let timestamp = Local::now();
        let base = format!(
            "{}_{}",
            safe_title(title),
            timestamp.format("%Y%m%d_%H%M%S")
        );
        let export_path = self.exports_dir.join(format!("{}.wav", base));

        let mut audio = import_audio(file_path)?;
        master(&mut audio);
        export_audio(&audio, &export_path, self.format)?;

        let file_size_bytes = fs::metadata(&export_path)?.len();
        let checksum = sha256_file(&export_path)?;

        let report_path = self.exports_dir.join(format!("{}_report.json", base));
        let report = self.report(title, &export_path, file_size_bytes, &checksum, metadata);
        let report_path = match fs::write(&report_path, serde_json::to_string_pretty(&report)?) {
            Ok(()) => Some(report_path),
            Err(e) => {
                warn!(path = %report_path.display(), error = %e, "could not write mix report");
                None
            }
        };

        let script_path = self.exports_dir.join(format!("{}_script.txt", base));
        let script = format!(
            "# Mixforge reconstruction script\n# Mix: {}\n# Generated: {}\n\n{}\n",
            metadata.title.as_deref().unwrap_or(title),
            timestamp.to_rfc3339(),
            metadata
                .script
                .as_deref()
                .unwrap_or("# Reconstruction script not available"),
        );
        let script_path = match fs::write(&script_path, script) {
            Ok(()) => Some(script_path),
            Err(e) => {
                warn!(path = %script_path.display(), error = %e, "could not write script");
                None
            }
        };

        info!(
            path = %export_path.display(),
            bytes = file_size_bytes,
            "final mix exported"
        );

        Ok(ExportOutcome {
            status: "success".to_string(),
            export_path,
            report_path,
            script_path,
            file_size_bytes,
            file_size_mb: file_size_bytes as f64 / (1024.0 * 1024.0),
            duration_seconds: audio.duration_secs(),
            format: "wav".to_string(),
            metadata: metadata.clone(),
            checksum,
        })
    }

    fn report(
        &self,
        title: &str,
        export_path: &Path,
        size_bytes: u64,
        checksum: &str,
        metadata: &ExportMetadata,
    ) -> Value {
        let size_mb = (size_bytes as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0;
        json!({
            "mix_title": title,
            "export_timestamp": Local::now().to_rfc3339(),
            "file_info": {
                "path": export_path,
                "size_bytes": size_bytes,
                "size_mb": size_mb,
                "sha256": checksum,
            },
            "mix_metadata": metadata,
            "tags": {
                "title": title,
                "artist": metadata.artist.as_deref().unwrap_or("Mixforge"),
                "album": metadata.album.as_deref().unwrap_or("Generated Mix"),
                "year": Local::now().year(),
                "genre": metadata.genre.as_deref().unwrap_or("Electronic"),
                "comment": {
                    "bpm": metadata.bpm.unwrap_or(0.0),
                    "vibe": metadata.vibe.as_deref().unwrap_or(""),
                    "tracks_used": metadata.tracks_used.unwrap_or(0),
                    "mix_style": metadata.mix_style.as_deref().unwrap_or(""),
                    "generated_by": TOOL_VERSION,
                },
            },
            "generation_info": {
                "tool_version": TOOL_VERSION,
                "dependencies": ["hound", "symphonia", "rustfft"],
            },
            "audio_specs": {
                "format": "WAV",
                "sample_rate": format!("{} Hz", self.format.sample_rate),
                "bit_depth": self.format.bit_depth,
                "channels": if self.channels == 1 { "Mono" } else { "Stereo" },
            },
        })
    }

    /// Bundle an export into `<base>_package/` with a README
    ///
    /// When `include_source_files` is set, `sources` are copied into
    /// `source_tracks/`; unreadable sources are skipped.
    pub fn create_mix_package(
        &self,
        export: &ExportOutcome,
        include_source_files: bool,
        sources: &[PathBuf],
    ) -> Result<PackageOutcome> {
        if export.status != "success" {
            return Err(MixerError::InvalidParameter {
                param: "export_result".to_string(),
                value: export.status.clone(),
                expected: "a successful export".to_string(),
            });
        }
        if !export.export_path.exists() {
            return Err(MixerError::NotFound {
                path: export.export_path.display().to_string(),
            });
        }

        let package_dir = self
            .exports_dir
            .join(format!("{}_package", file_stem(&export.export_path)));
        fs::create_dir_all(&package_dir)?;

        fs::copy(
            &export.export_path,
            package_dir.join(file_name(&export.export_path)),
        )?;
        for extra in [&export.report_path, &export.script_path].into_iter().flatten() {
            if extra.exists() {
                fs::copy(extra, package_dir.join(file_name(extra)))?;
            }
        }

        fs::write(package_dir.join("README.md"), readme(export))?;

        if include_source_files {
            let source_dir = package_dir.join("source_tracks");
            fs::create_dir_all(&source_dir)?;
            for source in sources {
                if let Err(e) = fs::copy(source, source_dir.join(file_name(source))) {
                    warn!(path = %source.display(), error = %e, "could not copy source track");
                }
            }
        }

        let mut files_included: Vec<String> = WalkDir::new(&package_dir)
            .min_depth(1)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| {
                entry
                    .path()
                    .strip_prefix(&package_dir)
                    .ok()
                    .map(|p| p.to_string_lossy().into_owned())
            })
            .collect();
        files_included.sort();

        info!(
            path = %package_dir.display(),
            files = files_included.len(),
            "mix package created"
        );

        Ok(PackageOutcome {
            status: "success".to_string(),
            package_path: package_dir,
            files_included,
        })
    }
}

fn readme(export: &ExportOutcome) -> String {
    let meta = &export.metadata;
    let or_unknown = |v: Option<String>| v.unwrap_or_else(|| "Unknown".to_string());

    format!(
        "# Generated Music Mix\n\n\
         ## Mix Information\n\
         - **Title**: {title}\n\
         - **Duration**: {duration:.1} seconds\n\
         - **BPM**: {bpm}\n\
         - **Genre**: {genre}\n\
         - **Vibe**: {vibe}\n\n\
         ## Technical Details\n\
         - **Format**: {format}\n\
         - **File Size**: {size:.1} MB\n\
         - **SHA-256**: {checksum}\n\n\
         ## Generation Details\n\
         - **Tracks Used**: {tracks}\n\
         - **Mix Style**: {style}\n\
         - **Generated**: {generated}\n\n\
         ## Files Included\n\
         - `{mix_file}` - The final mix\n\
         - `*_report.json` - Detailed generation report\n\
         - `*_script.txt` - Script to reproduce the mix\n\
         - `README.md` - This file\n\n\
         ## Usage Rights\n\
         This mix uses royalty-free source material. Please verify licensing for commercial use.\n\n\
         ---\n\
         Generated by {tool}\n",
        title = meta.title.as_deref().unwrap_or("Untitled Mix"),
        duration = export.duration_seconds,
        bpm = or_unknown(meta.bpm.map(|b| format!("{:.1}", b))),
        genre = meta.genre.as_deref().unwrap_or("Electronic"),
        vibe = or_unknown(meta.vibe.clone()),
        format = export.format.to_uppercase(),
        size = export.file_size_mb,
        checksum = export.checksum,
        tracks = or_unknown(meta.tracks_used.map(|t| t.to_string())),
        style = or_unknown(meta.mix_style.clone()),
        generated = Local::now().format("%Y-%m-%d %H:%M:%S"),
        mix_file = file_name(&export.export_path),
        tool = TOOL_VERSION,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::generate_test_tone;
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    const RATE: u32 = 8_000;

    fn exporter(root: &Path) -> (Exporter, MixerConfig) {
        let mut config = MixerConfig::rooted_at(root);
        config.audio.sample_rate = RATE;
        config.ensure_directories().unwrap();
        (Exporter::new(&config), config)
    }

    fn write_mix(dir: &Path, secs: f32) -> PathBuf {
        let path = dir.join("mix_draft_2tracks.wav");
        export_audio(&generate_test_tone(220.0, secs, RATE), &path, ExportFormat::new(RATE, 16))
            .unwrap();
        path
    }

    #[test]
    fn test_safe_title() {
        assert_eq!(safe_title("Late Night: Study/Beats!  "), "Late Night StudyBeats");
        assert_eq!(safe_title("???"), "mix");
    }

    #[test]
    fn test_master_ceiling_and_fades() {
        let mut audio = generate_test_tone(220.0, 12.0, RATE);
        master(&mut audio);
        assert!(calculate_peak(&audio) <= PEAK_CEILING_DB + 0.01);
        assert!(audio.samples[0][0].abs() < 1e-3);
        assert!(audio.samples[0][audio.len() - 1].abs() < 1e-3);
    }

    #[test]
    fn test_master_short_mix_keeps_edges() {
        let mut audio = generate_test_tone(220.0, 2.0, RATE);
        master(&mut audio);
        // Sample 10 of a 220 Hz tone is well away from a zero crossing
        assert!(audio.samples[0][10].abs() > 0.1);
    }

    #[test]
    fn test_export_writes_report_and_script() {
        let dir = tempdir().unwrap();
        let (exporter, config) = exporter(dir.path());
        let mix = write_mix(dir.path(), 1.0);
        let metadata = ExportMetadata {
            bpm: Some(90.0),
            script: Some("mixed = track_0".to_string()),
            ..ExportMetadata::default()
        };

        let outcome = exporter.export_final_mix(&mix, "Chill: Beats", &metadata).unwrap();
        assert_eq!(outcome.status, "success");
        assert!(outcome.export_path.starts_with(&config.directories.exports_dir));
        let name = file_name(&outcome.export_path);
        assert!(name.starts_with("Chill Beats_"), "{}", name);
        assert!(name.ends_with(".wav"));
        assert_eq!(outcome.checksum, sha256_file(&outcome.export_path).unwrap());
        assert_relative_eq!(outcome.duration_seconds, 1.0, epsilon = 1e-3);

        let report: Value =
            serde_json::from_str(&fs::read_to_string(outcome.report_path.unwrap()).unwrap())
                .unwrap();
        assert_eq!(report["mix_title"], "Chill: Beats");
        assert_eq!(report["file_info"]["sha256"], json!(outcome.checksum));
        assert_eq!(report["mix_metadata"]["bpm"], json!(90.0));

        let script = fs::read_to_string(outcome.script_path.unwrap()).unwrap();
        assert!(script.contains("mixed = track_0"));
    }

    #[test]
    fn test_export_missing_file() {
        let dir = tempdir().unwrap();
        let (exporter, _) = exporter(dir.path());
        let err = exporter
            .export_final_mix(&dir.path().join("none.wav"), "x", &ExportMetadata::default())
            .unwrap_err();
        assert_eq!(err.error_code(), "NOT_FOUND");
    }

    #[test]
    fn test_package_lists_files() {
        let dir = tempdir().unwrap();
        let (exporter, _) = exporter(dir.path());
        let mix = write_mix(dir.path(), 1.0);
        let export = exporter
            .export_final_mix(&mix, "Pack", &ExportMetadata::default())
            .unwrap();

        let package = exporter
            .create_mix_package(&export, true, &[mix.clone()])
            .unwrap();
        assert_eq!(package.files_included.len(), 5);
        assert!(package.files_included.contains(&"README.md".to_string()));
        assert!(package
            .files_included
            .iter()
            .any(|f| f.ends_with("mix_draft_2tracks.wav") && f.starts_with("source_tracks")));
    }

    #[test]
    fn test_package_rejects_failed_export() {
        let dir = tempdir().unwrap();
        let (exporter, _) = exporter(dir.path());
        let export: ExportOutcome = serde_json::from_value(json!({
            "status": "error",
            "export_path": dir.path().join("x.wav"),
        }))
        .unwrap();
        assert!(exporter.create_mix_package(&export, false, &[]).is_err());
    }
}
