//! Pipeline Tests
//!
//! End-to-end tests for mix assembly, the feedback loop and export.

use std::path::{Path, PathBuf};

use approx::assert_relative_eq;
use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::tempdir;
use test_case::test_case;

use mixforge::engine::{export_audio, generate_test_tone, import_audio, ExportFormat};
use mixforge::feedback::{
    apply_feedback_suggestions, FeedbackRecord, ImprovementLoop, IterationStatus, LoopTerminal,
    Suggestion,
};
use mixforge::mix::{MixGenerator, MixRequest, TrackAnalysis};
use mixforge::services::{ExportMetadata, Exporter, ScriptedJudge};
use mixforge::MixerConfig;

const RATE: u32 = 8_000;

fn config(root: &Path) -> MixerConfig {
    let mut config = MixerConfig::rooted_at(root);
    config.audio.sample_rate = RATE;
    config.ensure_directories().unwrap();
    config
}

fn write_tone(dir: &Path, name: &str, secs: f32) -> PathBuf {
    let path = dir.join(name);
    let tone = generate_test_tone(330.0, secs, RATE);
    export_audio(&tone, &path, ExportFormat::new(RATE, 16)).unwrap();
    path
}

fn analysis(path: &Path, tempo: f64, energy_mean: f64, level: &str) -> TrackAnalysis {
    let mut analysis = TrackAnalysis::for_path(path.display().to_string());
    analysis.tempo = Some(tempo);
    analysis.energy_mean = Some(energy_mean);
    analysis.energy_level = Some(level.to_string());
    analysis
}

fn paths(files: &[&PathBuf]) -> Vec<String> {
    files.iter().map(|p| p.display().to_string()).collect()
}

// === Mix Assembly ===

#[test]
fn test_three_track_seamless_crossfade() {
    let dir = tempdir().unwrap();
    let config = config(dir.path());
    let a = write_tone(dir.path(), "a.wav", 2.0);
    let b = write_tone(dir.path(), "b.wav", 2.0);
    let c = write_tone(dir.path(), "c.wav", 2.0);

    let request = MixRequest::new(paths(&[&a, &b, &c]))
        .with_analyses(vec![
            analysis(&a, 85.0, 0.05, "medium"),
            analysis(&b, 90.0, 0.12, "high"),
            analysis(&c, 88.0, 0.03, "low"),
        ])
        .with_transition("crossfade")
        .with_style("seamless")
        .with_fade(1000);

    let outcome = MixGenerator::new(&config).generate_mix(&request).unwrap();

    assert_eq!(outcome.tracks_used, 3);
    assert_eq!(outcome.duration_ms, 4000);
    assert_relative_eq!(outcome.mix_metadata.final_bpm, 87.6667, epsilon = 0.01);
    assert_eq!(
        outcome.mix_metadata.energy_progression,
        vec!["medium", "high", "low"]
    );
    assert!(outcome.draft_path.ends_with("mix_draft_3tracks.wav"));
}

#[test_case(3000, 6000 ; "fade shorter than both tracks")]
#[test_case(10000, 5000 ; "fade capped by shorter track")]
fn test_crossfade_overlap(fade_ms: u64, expected_ms: u64) {
    let dir = tempdir().unwrap();
    let config = config(dir.path());
    let a = write_tone(dir.path(), "a.wav", 5.0);
    let b = write_tone(dir.path(), "b.wav", 4.0);

    let request = MixRequest::new(paths(&[&a, &b]))
        .with_transition("crossfade")
        .with_fade(fade_ms);
    let outcome = MixGenerator::new(&config).generate_mix(&request).unwrap();

    assert_eq!(outcome.duration_ms, expected_ms);
}

#[test]
fn test_energetic_progression_is_sorted() {
    let dir = tempdir().unwrap();
    let config = config(dir.path());
    let a = write_tone(dir.path(), "a.wav", 1.0);
    let b = write_tone(dir.path(), "b.wav", 1.0);
    let c = write_tone(dir.path(), "c.wav", 1.0);

    let request = MixRequest::new(paths(&[&a, &b, &c]))
        .with_analyses(vec![
            analysis(&a, 120.0, 0.30, "high"),
            analysis(&b, 120.0, 0.01, "low"),
            analysis(&c, 120.0, 0.07, "medium"),
        ])
        .with_style("energetic")
        .with_fade(400);
    let outcome = MixGenerator::new(&config).generate_mix(&request).unwrap();

    assert_eq!(
        outcome.mix_metadata.energy_progression,
        vec!["low", "medium", "high"]
    );
    assert_eq!(outcome.mix_metadata.mix_style, "energetic");
}

// === Feedback Loop ===

#[test_case(&[6, 8], 2, LoopTerminal::Satisfied ; "satisfied on second judgment")]
#[test_case(&[5, 5, 5], 3, LoopTerminal::Exhausted ; "budget exhausted")]
#[test_case(&[9], 1, LoopTerminal::Satisfied ; "satisfied immediately")]
fn test_improvement_loop(ratings: &[u8], iterations: usize, terminal: LoopTerminal) {
    let dir = tempdir().unwrap();
    let config = config(dir.path());
    let mix = write_tone(&config.directories.temp_dir, "mix_draft_1tracks.wav", 1.0);

    let judge = ScriptedJudge::ratings(ratings);
    let outcome = ImprovementLoop::new(&judge, &config).run(&mix, "chill study mix", None);

    assert_eq!(outcome.iterations, iterations);
    assert_eq!(outcome.iteration_history.len(), iterations);
    assert_eq!(outcome.terminal, terminal);
    assert_eq!(outcome.status, "completed");
    assert_eq!(outcome.final_rating, *ratings.last().unwrap());
    assert!(outcome.final_mix.exists());
}

#[test]
fn test_exhausted_history_statuses() {
    let dir = tempdir().unwrap();
    let config = config(dir.path());
    let mix = write_tone(&config.directories.temp_dir, "mix_draft_1tracks.wav", 1.0);

    let judge = ScriptedJudge::ratings(&[5, 5, 5]);
    let outcome = ImprovementLoop::new(&judge, &config).run(&mix, "chill", None);

    let statuses: Vec<IterationStatus> = outcome
        .iteration_history
        .iter()
        .map(|r| r.status)
        .collect();
    assert_eq!(
        statuses,
        vec![
            IterationStatus::Improved,
            IterationStatus::Improved,
            IterationStatus::Exhausted
        ]
    );
    assert!(outcome.final_mix.ends_with("mix_improved_v3.wav"));
}

#[test]
fn test_judge_failure_keeps_history() {
    let dir = tempdir().unwrap();
    let config = config(dir.path());
    let mix = write_tone(&config.directories.temp_dir, "mix_draft_1tracks.wav", 1.0);

    let judge = ScriptedJudge::ratings(&[4]).then_fail("service down");
    let outcome = ImprovementLoop::new(&judge, &config).run(&mix, "chill", None);

    assert_eq!(outcome.terminal, LoopTerminal::Failed);
    assert_eq!(outcome.status, "failed");
    assert_eq!(outcome.iteration_history.len(), 1);
    assert!(outcome.error.unwrap().contains("service down"));
}

#[test]
fn test_unknown_action_changes_nothing() {
    let dir = tempdir().unwrap();
    let mix = write_tone(dir.path(), "mix.wav", 1.0);
    let output = dir.path().join("mix_v1.wav");

    let record = FeedbackRecord::rated(5, "needs work").with_suggestion(Suggestion::new(
        "eq",
        json!({"frequency": 200, "gain_db": -3}),
        "muddy low end",
    ));
    let outcome =
        apply_feedback_suggestions(&mix, &record, &output, ExportFormat::new(RATE, 16)).unwrap();

    assert!(outcome.applied_changes.is_empty());
    assert_eq!(outcome.duration_ms, 1000);
    assert!(output.exists());
}

#[test]
fn test_trim_and_fade_suggestions() {
    let dir = tempdir().unwrap();
    let mix = write_tone(dir.path(), "mix.wav", 2.0);
    let output = dir.path().join("mix_v1.wav");

    let record = FeedbackRecord::rated(6, "too long")
        .with_suggestion(Suggestion::new(
            "trim",
            json!({"start_ms": 500, "end_ms": 1500}),
            "cut the edges",
        ))
        .with_suggestion(Suggestion::new(
            "fade_adjustment",
            json!({"fade_in_ms": 100, "fade_out_ms": 200}),
            "softer edges",
        ));
    let outcome =
        apply_feedback_suggestions(&mix, &record, &output, ExportFormat::new(RATE, 16)).unwrap();

    assert_eq!(
        outcome.applied_changes,
        vec![
            "Trimmed audio: 500ms to 1500ms".to_string(),
            "Applied fades: in=100ms, out=200ms".to_string(),
        ]
    );
    assert_eq!(import_audio(&output).unwrap().duration_ms(), 1000);
}

// === Export ===

#[test]
fn test_export_then_package() {
    let dir = tempdir().unwrap();
    let config = config(dir.path());
    let a = write_tone(dir.path(), "a.wav", 1.0);
    let b = write_tone(dir.path(), "b.wav", 1.0);

    let request = MixRequest::new(paths(&[&a, &b])).with_fade(500);
    let mix = MixGenerator::new(&config).generate_mix(&request).unwrap();

    let metadata = ExportMetadata {
        script: Some(mix.script_text.clone()),
        ..ExportMetadata::default()
    };
    let exporter = Exporter::new(&config);
    let export = exporter
        .export_final_mix(&mix.draft_path, "Night Drive", &metadata)
        .unwrap();

    assert_eq!(export.status, "success");
    assert!(export.export_path.exists());
    assert_eq!(export.checksum.len(), 64);

    let package = exporter
        .create_mix_package(&export, true, &mix.sources)
        .unwrap();
    assert!(package.package_path.join("README.md").exists());
    assert!(package
        .files_included
        .iter()
        .any(|f| f.starts_with("source_tracks")));
}
