//! Mixforge CLI - AI Music Mixer
//!
//! Command-line interface for the Mixforge agent and its pipeline stages.

use std::path::Path;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use tracing::info;
use tracing_subscriber::EnvFilter;

use mixforge::cli::{commands, Cli, Commands};
use mixforge::MixerConfig;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logger
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    info!("Mixforge v{}", env!("CARGO_PKG_VERSION"));

    let config = commands::load_config(cli.config.as_deref(), cli.output_dir.as_deref())
        .context("failed to load configuration")?;

    if let Some(cmd) = cli.command {
        return handle_command(cmd, &config);
    }

    if cli.setup || config.services.openai_api_key.is_none() {
        commands::run_setup(&config, Path::new(".env")).context("setup failed")?;
        return Ok(());
    }

    if cli.suggest {
        commands::run_suggestions(&config, &cli.mood, cli.genre.as_deref(), cli.duration)
            .context("failed to generate suggestions")?;
    } else if let Some(prompt) = cli.prompt.as_deref() {
        commands::run_single_mix(&config, prompt, cli.duration)
            .with_context(|| format!("failed to create mix for '{}'", prompt))?;
    } else {
        Cli::command().print_help()?;
    }
    Ok(())
}

fn handle_command(cmd: Commands, config: &MixerConfig) -> Result<()> {
    match cmd {
        Commands::Mix {
            files,
            transition,
            style,
            fade,
            analyze,
        } => commands::mix_files(config, &files, &transition, &style, fade, analyze)
            .context("mix generation failed"),
        Commands::Analyze { files, output } => {
            commands::analyze_files(&files, output.as_deref()).context("analysis failed")
        }
        Commands::Improve {
            mix,
            prompt,
            max_iterations,
        } => commands::improve_mix(config, &mix, &prompt, max_iterations)
            .context("improvement failed"),
    }
}
