//! Agent Tests
//!
//! Drive the orchestration loop end to end against scripted collaborators.

use std::path::{Path, PathBuf};

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tempfile::tempdir;
use test_case::test_case;

use mixforge::agent::{MixRun, Operation, OperationCall, Orchestrator, ReasoningTurn, ToolRegistry};
use mixforge::engine::{export_audio, generate_test_tone, ExportFormat};
use mixforge::services::{
    ExportOutcome, NullDiscovery, ScriptedJudge, ScriptedReasoner, StaticExtractor,
};
use mixforge::MixerConfig;

const RATE: u32 = 8_000;

fn setup(root: &Path) -> (MixerConfig, Vec<PathBuf>) {
    let mut config = MixerConfig::rooted_at(root);
    config.audio.sample_rate = RATE;
    config.ensure_directories().unwrap();

    let files: Vec<PathBuf> = ["first.wav", "second.wav"]
        .iter()
        .map(|name| {
            let path = config.directories.music_dir.join(name);
            let tone = generate_test_tone(261.6, 1.0, RATE);
            export_audio(&tone, &path, ExportFormat::new(RATE, 16)).unwrap();
            path
        })
        .collect();
    (config, files)
}

fn registry(config: &MixerConfig, files: Vec<PathBuf>, judge: ScriptedJudge) -> ToolRegistry {
    ToolRegistry::new(
        config,
        Box::new(NullDiscovery::returning(files)),
        Box::new(StaticExtractor::new()),
        Box::new(judge),
    )
}

fn call(name: &str, arguments: Value) -> ReasoningTurn {
    ReasoningTurn::calls(vec![OperationCall::new(name, arguments)])
}

fn strings(files: &[PathBuf]) -> Vec<String> {
    files.iter().map(|p| p.display().to_string()).collect()
}

// === Orchestration Loop ===

#[test]
fn test_full_run_completes() {
    let dir = tempdir().unwrap();
    let (config, files) = setup(dir.path());
    let draft = config.directories.temp_dir.join("mix_draft_2tracks.wav");

    let reasoner = ScriptedReasoner::new(vec![
        call("music_discovery_tool", json!({"query": "lofi", "max_tracks": 2})),
        call("batch_audio_analysis_tool", json!({"file_paths": strings(&files)})),
        call(
            "mix_generation_tool",
            json!({"file_paths": strings(&files), "fade_duration_ms": 500}),
        ),
        call(
            "iterative_improvement_tool",
            json!({"file_path": draft.display().to_string(), "prompt": "lofi"}),
        ),
        call(
            "final_mix_export_tool",
            json!({"file_path": draft.display().to_string(), "title": "Lofi Night"}),
        ),
        ReasoningTurn::answer("Your mix is ready"),
    ]);
    let registry = registry(&config, files.clone(), ScriptedJudge::ratings(&[9]));
    let mut orchestrator = Orchestrator::new(&config, Box::new(reasoner), registry);

    let run = orchestrator.create_mix("lofi beats to study to", 6);
    assert_eq!(run.status(), "completed");
    assert_eq!(run.turns(), 6);

    let MixRun::Completed {
        final_response,
        conversation,
        ..
    } = run
    else {
        panic!("expected a completed run");
    };
    assert_eq!(final_response, "Your mix is ready");
    assert!(conversation.messages[1]
        .content
        .contains("Target duration should be around 6 minutes"));

    let payloads = conversation.tool_payloads();
    assert_eq!(payloads.len(), 5);
    assert_eq!(payloads[0]["status"], "success");
    assert_eq!(payloads[0]["count"], 2);
    assert_eq!(payloads[1]["count"], 2);
    assert_eq!(payloads[2]["tracks_used"], 2);
    assert_eq!(payloads[2]["duration_ms"], 1500);
    assert_eq!(payloads[3]["terminal"], "satisfied");
    assert_eq!(payloads[3]["final_rating"], 9);
    assert_eq!(payloads[4]["status"], "success");
    assert_eq!(payloads[4]["metadata"]["tracks_used"], 2);
    assert_eq!(payloads[4]["metadata"]["title"], "Lofi Night");
    assert!(payloads[4]["metadata"]["script"].is_string());

    assert!(orchestrator.registry().last_mix().is_some());
}

#[test]
fn test_turn_budget_exhausted() {
    let dir = tempdir().unwrap();
    let (config, files) = setup(dir.path());

    let reasoner = ScriptedReasoner::repeating(call("make_coffee", json!({})));
    let registry = registry(&config, files, ScriptedJudge::default());
    let mut orchestrator =
        Orchestrator::new(&config, Box::new(reasoner), registry).with_max_turns(3);

    let run = orchestrator.create_mix("anything", 4);
    assert_eq!(run.status(), "max_iterations_reached");
    assert_eq!(run.turns(), 3);

    let conversation = run.conversation();
    assert_eq!(conversation.len(), 2 + 3 * 2);
    for payload in conversation.tool_payloads() {
        assert_eq!(payload["error_code"], "UNKNOWN_OPERATION");
        assert_eq!(payload["error"], "Unknown operation: make_coffee");
    }
}

#[test]
fn test_reasoning_failure_keeps_partial_history() {
    let dir = tempdir().unwrap();
    let (config, files) = setup(dir.path());

    let reasoner = ScriptedReasoner::new(vec![call("music_discovery_tool", json!({"query": "jazz"}))])
        .then_fail("connection reset");
    let registry = registry(&config, files, ScriptedJudge::default());
    let mut orchestrator = Orchestrator::new(&config, Box::new(reasoner), registry);

    let run = orchestrator.create_mix("jazz", 5);
    match &run {
        MixRun::Error { error, turns, conversation } => {
            assert!(error.contains("connection reset"));
            assert_eq!(*turns, 2);
            assert_eq!(conversation.len(), 4);
        }
        other => panic!("expected an error run, got {}", other.status()),
    }
}

#[test]
fn test_bad_arguments_become_error_payload() {
    let dir = tempdir().unwrap();
    let (config, files) = setup(dir.path());

    let reasoner = ScriptedReasoner::new(vec![
        call("mix_generation_tool", json!({"fade_duration_ms": 100})),
        ReasoningTurn::answer("gave up"),
    ]);
    let registry = registry(&config, files, ScriptedJudge::default());
    let mut orchestrator = Orchestrator::new(&config, Box::new(reasoner), registry);

    let run = orchestrator.create_mix("broken", 1);
    assert_eq!(run.status(), "completed");
    let payloads = run.conversation().tool_payloads();
    assert_eq!(payloads[0]["error_code"], "INVALID_PARAMETER");
    assert_eq!(payloads[0]["recoverable"], false);
}

#[test]
fn test_mix_failure_is_reported_not_raised() {
    let dir = tempdir().unwrap();
    let (config, files) = setup(dir.path());

    let reasoner = ScriptedReasoner::new(vec![
        call("mix_generation_tool", json!({"file_paths": ["ghost.mp3"]})),
        ReasoningTurn::answer("no luck"),
    ]);
    let registry = registry(&config, files, ScriptedJudge::default());
    let mut orchestrator = Orchestrator::new(&config, Box::new(reasoner), registry);

    let run = orchestrator.create_mix("ghosts", 1);
    let payloads = run.conversation().tool_payloads();
    assert_eq!(payloads[0]["error_code"], "NO_VALID_INPUT");
    assert!(orchestrator.registry().last_mix().is_none());
}

// === Suggestions ===

#[test]
fn test_suggestions_from_reasoning_service() {
    let dir = tempdir().unwrap();
    let (config, files) = setup(dir.path());

    let reasoner = ScriptedReasoner::new(vec![ReasoningTurn::answer(
        r#"["Sunset deep house", "Rainy day jazz"]"#,
    )]);
    let orchestrator = Orchestrator::new(
        &config,
        Box::new(reasoner),
        registry(&config, files, ScriptedJudge::default()),
    );

    assert_eq!(
        orchestrator.get_mix_suggestions("chill", Some("house"), 6),
        vec!["Sunset deep house", "Rainy day jazz"]
    );
}

#[test]
fn test_suggestions_fall_back_on_error() {
    let dir = tempdir().unwrap();
    let (config, files) = setup(dir.path());

    let orchestrator = Orchestrator::new(
        &config,
        Box::new(ScriptedReasoner::default()),
        registry(&config, files, ScriptedJudge::default()),
    );

    let suggestions = orchestrator.get_mix_suggestions("dreamy", None, 8);
    assert_eq!(suggestions.len(), 5);
    assert_eq!(suggestions[0], "Create a dreamy mix with smooth transitions");
}

// === Registry ===

#[test]
fn test_package_uses_last_mix_sources() {
    let dir = tempdir().unwrap();
    let (config, files) = setup(dir.path());
    let mut registry = registry(&config, files.clone(), ScriptedJudge::default());

    let mix = registry
        .execute(
            Operation::decode(
                "mix_generation_tool",
                &json!({"file_paths": strings(&files), "fade_duration_ms": 200}),
            )
            .unwrap(),
        )
        .unwrap();
    let draft = mix["draft_path"].as_str().unwrap().to_string();

    let export = registry
        .execute(
            Operation::decode(
                "final_mix_export_tool",
                &json!({"file_path": draft, "title": "Packaged"}),
            )
            .unwrap(),
        )
        .unwrap();
    let outcome: ExportOutcome = serde_json::from_value(export.clone()).unwrap();
    assert!(outcome.export_path.exists());

    let package = registry
        .execute(
            Operation::decode(
                "create_mix_package_tool",
                &json!({"export_result": export, "include_source_files": true}),
            )
            .unwrap(),
        )
        .unwrap();

    let included: Vec<String> = serde_json::from_value(package["files_included"].clone()).unwrap();
    assert!(included.contains(&"README.md".to_string()));
    assert!(included
        .iter()
        .any(|f| f.ends_with("first.wav") && f.starts_with("source_tracks")));
}

#[test_case(1000, 3 ; "capped at configured budget")]
#[test_case(2, 2 ; "lower request honoured")]
#[test_case(0, 1 ; "at least one pass")]
fn test_improvement_iterations_bounded(requested: u64, expected: usize) {
    let dir = tempdir().unwrap();
    let (config, files) = setup(dir.path());
    let mut registry = registry(&config, files.clone(), ScriptedJudge::ratings(&[5; 6]));

    let outcome = registry
        .execute(
            Operation::decode(
                "iterative_improvement_tool",
                &json!({
                    "file_path": files[0].display().to_string(),
                    "prompt": "lofi",
                    "max_iterations": requested,
                }),
            )
            .unwrap(),
        )
        .unwrap();

    assert_eq!(outcome["iterations"], expected);
    assert_eq!(outcome["terminal"], "exhausted");
}
