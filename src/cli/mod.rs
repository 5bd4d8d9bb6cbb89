//! CLI Module
//!
//! Command-line interface for Mixforge.

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Mixforge - AI-directed royalty-free music mixing
#[derive(Parser, Debug)]
#[command(name = "mixforge")]
#[command(version, about, long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    /// Describe the mix you want, e.g. "chill lo-fi for studying"
    pub prompt: Option<String>,

    /// Target mix duration in minutes
    #[arg(short, long, default_value_t = 6)]
    pub duration: u32,

    /// Directory for exported mixes
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// JSON configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print mix prompt ideas instead of mixing
    #[arg(long)]
    pub suggest: bool,

    /// Mood for --suggest
    #[arg(long, default_value = "chill")]
    pub mood: String,

    /// Genre for --suggest
    #[arg(long)]
    pub genre: Option<String>,

    /// Write a .env template and create the working directories
    #[arg(long)]
    pub setup: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Mix local files into a draft without the agent
    #[command(name = "mix")]
    Mix {
        /// Audio files, in mix order
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// crossfade, beat_match or simple
        #[arg(short, long, default_value = "crossfade")]
        transition: String,

        /// seamless, energetic or basic
        #[arg(short, long, default_value = "seamless")]
        style: String,

        /// Fade length in milliseconds
        #[arg(short, long, default_value_t = 3000)]
        fade: u64,

        /// Analyze the files first so transitions can use tempo and mixing points
        #[arg(short, long)]
        analyze: bool,
    },

    /// Analyze tracks and print the results as JSON
    #[command(name = "analyze")]
    Analyze {
        /// Audio files to analyze
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Write the JSON here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run the feedback-improvement loop on an existing mix
    #[command(name = "improve")]
    Improve {
        /// Mix file to improve
        mix: PathBuf,

        /// What the mix should sound like
        prompt: String,

        /// Override the configured iteration budget
        #[arg(short, long)]
        max_iterations: Option<usize>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_prompt_with_defaults() {
        let cli = Cli::try_parse_from(["mixforge", "chill lofi beats"]).unwrap();
        assert_eq!(cli.prompt.as_deref(), Some("chill lofi beats"));
        assert_eq!(cli.duration, 6);
        assert_eq!(cli.mood, "chill");
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_parse_suggest_flags() {
        let cli = Cli::try_parse_from([
            "mixforge", "--suggest", "--mood", "energetic", "--genre", "house", "-d", "10",
        ])
        .unwrap();
        assert!(cli.suggest);
        assert_eq!(cli.mood, "energetic");
        assert_eq!(cli.genre.as_deref(), Some("house"));
        assert_eq!(cli.duration, 10);
    }

    #[test]
    fn test_parse_mix_subcommand() {
        let cli = Cli::try_parse_from([
            "mixforge", "mix", "a.wav", "b.wav", "--style", "energetic", "-v",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Some(Commands::Mix {
                files,
                style,
                transition,
                fade,
                analyze,
            }) => {
                assert_eq!(files.len(), 2);
                assert_eq!(style, "energetic");
                assert_eq!(transition, "crossfade");
                assert_eq!(fade, 3000);
                assert!(!analyze);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_mix_requires_files() {
        assert!(Cli::try_parse_from(["mixforge", "mix"]).is_err());
    }
}
