//! Runtime configuration
//!
//! Defaults, overlaid by an optional JSON file, overlaid by environment
//! variables. API keys are only ever read from the environment.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{MixerError, Result};

/// Directory layout used for downloads, exports and scratch artifacts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Directories {
    pub music_dir: PathBuf,
    pub exports_dir: PathBuf,
    pub temp_dir: PathBuf,
}

impl Default for Directories {
    fn default() -> Self {
        Self {
            music_dir: PathBuf::from("music"),
            exports_dir: PathBuf::from("exports"),
            temp_dir: PathBuf::from("temp"),
        }
    }
}

/// Audio format every loaded segment is converted to
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    pub sample_rate: u32,
    pub channels: u16,
    pub bit_depth: u16,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            channels: 2,
            bit_depth: 16,
        }
    }
}

/// Mix defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MixSettings {
    pub default_fade_ms: u64,
    /// Upper bound on a mix, in seconds
    pub max_mix_duration_secs: u64,
    pub genre: String,
    pub vibe: String,
}

impl Default for MixSettings {
    fn default() -> Self {
        Self {
            default_fade_ms: 3000,
            max_mix_duration_secs: 600,
            genre: "Lo-Fi Hip Hop".to_string(),
            vibe: "Peaceful Study".to_string(),
        }
    }
}

/// Bounds for the feedback loop and the orchestration loop
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopPolicy {
    pub satisfaction_threshold: u8,
    pub max_iterations: usize,
    pub max_turns: usize,
}

impl Default for LoopPolicy {
    fn default() -> Self {
        Self {
            satisfaction_threshold: 8,
            max_iterations: 3,
            max_turns: 10,
        }
    }
}

/// Endpoints, credentials and timeouts for external services
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    pub openai_base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub jamendo_base_url: String,
    pub freesound_base_url: String,
    pub timeout_ms: u64,
    #[serde(skip)]
    pub openai_api_key: Option<String>,
    #[serde(skip)]
    pub jamendo_client_id: Option<String>,
    #[serde(skip)]
    pub freesound_api_key: Option<String>,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            openai_base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4".to_string(),
            temperature: 0.7,
            max_tokens: 2000,
            jamendo_base_url: "https://api.jamendo.com/v3.0".to_string(),
            freesound_base_url: "https://freesound.org/apiv2".to_string(),
            timeout_ms: 120_000,
            openai_api_key: None,
            jamendo_client_id: None,
            freesound_api_key: None,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MixerConfig {
    pub directories: Directories,
    pub audio: AudioSettings,
    pub mix: MixSettings,
    pub policy: LoopPolicy,
    pub services: ServiceSettings,
}

impl MixerConfig {
    /// Build a configuration from defaults and the environment
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file, then apply environment overrides
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(MixerError::NotFound {
                path: path.display().to_string(),
            });
        }
        let text = fs::read_to_string(path)?;
        let mut config: MixerConfig =
            serde_json::from_str(&text).map_err(|e| MixerError::Config {
                reason: format!("{}: {}", path.display(), e),
            })?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Configuration rooted at a single directory (used by tests and `--output-dir`)
    pub fn rooted_at(root: &Path) -> Self {
        let mut config = Self::default();
        config.directories = Directories {
            music_dir: root.join("music"),
            exports_dir: root.join("exports"),
            temp_dir: root.join("temp"),
        };
        config
    }

    fn apply_env(&mut self) {
        let non_empty = |key: &str| env::var(key).ok().filter(|v| !v.trim().is_empty());

        self.services.openai_api_key = non_empty("OPENAI_API_KEY");
        self.services.jamendo_client_id = non_empty("JAMENDO_CLIENT_ID");
        self.services.freesound_api_key = non_empty("FREESOUND_API_KEY");

        if let Some(url) = non_empty("MIXFORGE_OPENAI_BASE_URL") {
            self.services.openai_base_url = url;
        }
        if let Some(model) = non_empty("MIXFORGE_MODEL") {
            self.services.model = model;
        }
        if let Some(timeout) = non_empty("MIXFORGE_TIMEOUT_MS").and_then(|s| s.parse().ok()) {
            self.services.timeout_ms = timeout;
        }
        if let Some(dir) = non_empty("MIXFORGE_MUSIC_DIR") {
            self.directories.music_dir = PathBuf::from(dir);
        }
        if let Some(dir) = non_empty("MIXFORGE_EXPORTS_DIR") {
            self.directories.exports_dir = PathBuf::from(dir);
        }
        if let Some(dir) = non_empty("MIXFORGE_TEMP_DIR") {
            self.directories.temp_dir = PathBuf::from(dir);
        }
        if let Some(n) = non_empty("MIXFORGE_MAX_ITERATIONS").and_then(|s| s.parse().ok()) {
            self.policy.max_iterations = n;
        }
        if let Some(t) = non_empty("MIXFORGE_SATISFACTION_THRESHOLD").and_then(|s| s.parse().ok())
        {
            self.policy.satisfaction_threshold = t;
        }
    }

    /// Reject values the loops cannot run with
    pub fn validate(&self) -> Result<()> {
        if !(1..=10).contains(&self.policy.satisfaction_threshold) {
            return Err(MixerError::InvalidParameter {
                param: "satisfaction_threshold".to_string(),
                value: self.policy.satisfaction_threshold.to_string(),
                expected: "1 to 10".to_string(),
            });
        }
        if self.policy.max_iterations == 0 {
            return Err(MixerError::InvalidParameter {
                param: "max_iterations".to_string(),
                value: "0".to_string(),
                expected: "at least 1".to_string(),
            });
        }
        if self.policy.max_turns == 0 {
            return Err(MixerError::InvalidParameter {
                param: "max_turns".to_string(),
                value: "0".to_string(),
                expected: "at least 1".to_string(),
            });
        }
        if !(1..=2).contains(&self.audio.channels) {
            return Err(MixerError::UnsupportedFormat {
                format: format!("{}-channel output", self.audio.channels),
            });
        }
        Ok(())
    }

    /// Create the music, exports and temp directories if missing
    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [
            &self.directories.music_dir,
            &self.directories.exports_dir,
            &self.directories.temp_dir,
        ] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}
