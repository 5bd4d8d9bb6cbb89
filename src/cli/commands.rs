//! CLI Command Implementations
//!
//! Implements the actual logic for each CLI command.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::agent::{MixRun, Orchestrator};
use crate::config::MixerConfig;
use crate::error::{MixerError, Result};
use crate::feedback::ImprovementLoop;
use crate::mix::{MixGenerator, MixRequest};
use crate::services::{AnalysisEntry, BasicFeatureExtractor, FeatureExtractor, OpenAiClient};

const ENV_TEMPLATE: &str = "# Mixforge Configuration
OPENAI_API_KEY=your_openai_api_key_here
JAMENDO_CLIENT_ID=your_jamendo_client_id_here
FREESOUND_API_KEY=your_freesound_api_key_here
";

/// Resolve configuration from an optional file and the environment.
///
/// `output_dir` replaces the exports directory.
pub fn load_config(config_path: Option<&Path>, output_dir: Option<&Path>) -> Result<MixerConfig> {
    let mut config = match config_path {
        Some(path) => MixerConfig::load(path)?,
        None => MixerConfig::from_env()?,
    };
    if let Some(dir) = output_dir {
        config.directories.exports_dir = dir.to_path_buf();
    }
    Ok(config)
}

/// Write the `.env` template unless one already exists.
///
/// Returns true when a new file was written.
pub fn write_env_template(path: &Path) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    fs::write(path, ENV_TEMPLATE)?;
    Ok(true)
}

/// First-run setup: API key template plus working directories.
pub fn run_setup(config: &MixerConfig, env_path: &Path) -> Result<()> {
    println!("Mixforge Setup");
    println!("{:=<50}", "");

    if write_env_template(env_path)? {
        println!("Created {}", env_path.display());
    }
    println!("Please edit {} and add your API keys:", env_path.display());
    println!("1. OpenAI API Key (required) - https://platform.openai.com/api-keys");
    println!("2. Jamendo Client ID (optional) - https://developer.jamendo.com/");
    println!("3. Freesound API Key (optional) - https://freesound.org/apiv2/");
    println!();
    println!("After adding your keys, run the mixer again!");

    config.ensure_directories()?;
    println!(
        "Created directories: {}, {}, {}",
        config.directories.music_dir.display(),
        config.directories.exports_dir.display(),
        config.directories.temp_dir.display()
    );
    Ok(())
}

/// Print prompt ideas for a mood.
pub fn run_suggestions(
    config: &MixerConfig,
    mood: &str,
    genre: Option<&str>,
    duration: u32,
) -> Result<()> {
    let title = format!("Mix Suggestions for {} {}", mood, genre.unwrap_or_default());
    println!("{}", title.trim());
    println!("{:=<50}", "");

    let orchestrator = Orchestrator::from_config(config);
    for (i, suggestion) in orchestrator
        .get_mix_suggestions(mood, genre, duration)
        .iter()
        .enumerate()
    {
        println!("{}. {}", i + 1, suggestion);
    }

    println!("\nUse any of these prompts with:");
    println!("mixforge-cli \"your chosen prompt\"");
    Ok(())
}

/// Let the agent build, improve and export one mix.
pub fn run_single_mix(config: &MixerConfig, prompt: &str, duration: u32) -> Result<()> {
    println!("Creating Mix: '{}'", prompt);
    println!("Target Duration: {} minutes", duration);
    println!("{:=<50}", "");
    println!("This may take a few minutes...");

    config.ensure_directories()?;
    let mut orchestrator = Orchestrator::from_config(config);
    let run = orchestrator.create_mix(prompt, duration);

    match &run {
        MixRun::Completed { final_response, turns, .. } => {
            println!("\nMix creation completed in {} turns", turns);
            println!("{}", final_response);
            println!(
                "Check {} for your mix.",
                config.directories.exports_dir.display()
            );
            Ok(())
        }
        MixRun::MaxTurnsReached { turns, .. } => {
            warn!(turns, "agent stopped before finishing");
            println!("\nStopped after {} turns without a final answer.", turns);
            if let Some(mix) = orchestrator.registry().last_mix() {
                println!("Latest draft: {}", mix.draft_path.display());
            }
            Ok(())
        }
        MixRun::Error { error, .. } => Err(MixerError::ProcessingError {
            reason: format!("Mix creation failed: {}", error),
        }),
    }
}

fn analyze_all(files: &[PathBuf]) -> Vec<AnalysisEntry> {
    BasicFeatureExtractor::new().batch_analyze(files)
}

/// Mix local files into a draft without the agent.
pub fn mix_files(
    config: &MixerConfig,
    files: &[PathBuf],
    transition: &str,
    style: &str,
    fade_ms: u64,
    analyze: bool,
) -> Result<()> {
    config.ensure_directories()?;
    let paths: Vec<String> = files.iter().map(|p| p.display().to_string()).collect();

    let mut request = MixRequest::new(paths.clone())
        .with_transition(transition)
        .with_style(style)
        .with_fade(fade_ms);
    if analyze {
        info!(tracks = files.len(), "analyzing tracks before mixing");
        let analyses = analyze_all(files)
            .into_iter()
            .zip(&paths)
            .map(|(entry, path)| {
                entry
                    .analysis()
                    .cloned()
                    .unwrap_or_else(|| crate::mix::TrackAnalysis::for_path(path.as_str()))
            })
            .collect();
        request = request.with_analyses(analyses);
    }

    let outcome = MixGenerator::new(config).generate_mix(&request)?;
    println!("Draft written: {}", outcome.draft_path.display());
    println!(
        "Tracks: {}  Duration: {:.1}s  BPM: {:.1}",
        outcome.tracks_used, outcome.duration_seconds, outcome.mix_metadata.final_bpm
    );
    println!();
    println!("{}", outcome.script_text);
    Ok(())
}

/// Analyze files and print or save the JSON results.
pub fn analyze_files(files: &[PathBuf], output: Option<&Path>) -> Result<()> {
    let entries = analyze_all(files);
    let json = serde_json::to_string_pretty(&entries)?;
    match output {
        Some(path) => {
            fs::write(path, json)?;
            println!("Analysis written: {}", path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

/// Run the feedback loop on an existing mix.
pub fn improve_mix(
    config: &MixerConfig,
    mix: &Path,
    prompt: &str,
    max_iterations: Option<usize>,
) -> Result<()> {
    if !mix.exists() {
        return Err(MixerError::NotFound {
            path: mix.display().to_string(),
        });
    }
    config.ensure_directories()?;

    let judge = OpenAiClient::new(config);
    let mut improvement = ImprovementLoop::new(&judge, config);
    if let Some(max) = max_iterations {
        improvement = improvement.with_max_iterations(max);
    }
    let outcome = improvement.run(mix, prompt, None);

    for record in &outcome.iteration_history {
        println!(
            "Iteration {}: rating {}/10 ({:?})",
            record.iteration, record.rating, record.status
        );
        for change in &record.applied_changes {
            println!("  - {}", change);
        }
    }
    println!("Final mix: {}", outcome.final_mix.display());
    println!("Final rating: {}/10", outcome.final_rating);

    match outcome.error {
        Some(error) => Err(MixerError::ProcessingError {
            reason: format!("Improvement failed: {}", error),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_env_template_written_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".env");

        assert!(write_env_template(&path).unwrap());
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("OPENAI_API_KEY="));
        assert!(text.contains("FREESOUND_API_KEY="));

        fs::write(&path, "OPENAI_API_KEY=real").unwrap();
        assert!(!write_env_template(&path).unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), "OPENAI_API_KEY=real");
    }

    #[test]
    fn test_output_dir_overrides_exports() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("mixforge.json");
        fs::write(&config_path, "{}").unwrap();

        let config = load_config(Some(&config_path), Some(dir.path())).unwrap();
        assert_eq!(config.directories.exports_dir, dir.path());
    }

    #[test]
    fn test_improve_missing_mix() {
        let dir = tempdir().unwrap();
        let config = MixerConfig::rooted_at(dir.path());
        let err = improve_mix(&config, &dir.path().join("nope.wav"), "chill", None).unwrap_err();
        assert_eq!(err.error_code(), "NOT_FOUND");
    }
}
