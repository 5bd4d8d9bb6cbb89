//! Royalty-free track discovery
//!
//! Searches Jamendo and Freesound, keeps tracks inside the requested
//! duration range and downloads them into the music directory. Discovery
//! never fails: every problem is logged and yields fewer (or no) files.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::MixerConfig;
use crate::error::{MixerError, Result};

fn default_duration_min() -> u32 {
    60
}

fn default_duration_max() -> u32 {
    300
}

fn default_max_tracks() -> usize {
    5
}

/// Search parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryQuery {
    pub query: String,
    /// Seconds
    #[serde(default = "default_duration_min")]
    pub duration_min: u32,
    /// Seconds
    #[serde(default = "default_duration_max")]
    pub duration_max: u32,
    #[serde(default = "default_max_tracks")]
    pub max_tracks: usize,
}

impl DiscoveryQuery {
    pub fn new(query: &str) -> Self {
        Self {
            query: query.to_string(),
            duration_min: default_duration_min(),
            duration_max: default_duration_max(),
            max_tracks: default_max_tracks(),
        }
    }

    fn accepts(&self, duration: f64) -> bool {
        (self.duration_min as f64..=self.duration_max as f64).contains(&duration)
    }
}

/// A search hit that can be downloaded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackCandidate {
    pub id: String,
    pub name: String,
    pub artist: String,
    pub duration: f64,
    pub download_url: String,
    pub source: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bpm: Option<f64>,
}

impl TrackCandidate {
    /// `<artist>_<name>_<id>.mp3`, keeping only alphanumerics, spaces, `-` and `_`
    pub fn file_name(&self) -> String {
        let stem: String = format!("{}_{}", self.artist, self.name)
            .chars()
            .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
            .collect();
        format!("{}_{}.mp3", stem.trim_end(), self.id)
    }
}

/// Tool payload reported back to the reasoning service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryResult {
    /// "success" or "no_results"
    pub status: String,
    pub downloaded_files: Vec<PathBuf>,
    pub count: usize,
    pub query: String,
}

impl DiscoveryResult {
    pub fn new(query: &DiscoveryQuery, downloaded_files: Vec<PathBuf>) -> Self {
        Self {
            status: if downloaded_files.is_empty() {
                "no_results"
            } else {
                "success"
            }
            .to_string(),
            count: downloaded_files.len(),
            downloaded_files,
            query: query.query.clone(),
        }
    }
}

/// Finds tracks and makes them available locally
pub trait TrackDiscovery {
    /// Downloaded file paths; empty on any failure
    fn discover(&self, query: &DiscoveryQuery) -> Vec<PathBuf>;
}

// ============================================================================
// Response parsing
// ============================================================================

fn id_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

fn as_duration(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

fn string_list(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// Tracks from a Jamendo `/tracks` response that fit the query
pub fn parse_jamendo(body: &Value, query: &DiscoveryQuery) -> Vec<TrackCandidate> {
    let results = body["results"].as_array().cloned().unwrap_or_default();
    results
        .iter()
        .filter_map(|track| {
            let duration = as_duration(&track["duration"]);
            if !query.accepts(duration) {
                return None;
            }
            let download_url = track["audio"].as_str().unwrap_or_default().to_string();
            if download_url.is_empty() {
                return None;
            }
            Some(TrackCandidate {
                id: id_string(&track["id"]),
                name: track["name"].as_str().unwrap_or_default().to_string(),
                artist: track["artist_name"].as_str().unwrap_or_default().to_string(),
                duration,
                download_url,
                source: "jamendo".to_string(),
                tags: string_list(&track["musicinfo"]["tags"]["genres"]),
                bpm: track["musicinfo"]["bpm"].as_f64().filter(|b| *b > 0.0),
            })
        })
        .collect()
}

/// Sounds from a Freesound text search that fit the query
pub fn parse_freesound(body: &Value, query: &DiscoveryQuery) -> Vec<TrackCandidate> {
    let results = body["results"].as_array().cloned().unwrap_or_default();
    results
        .iter()
        .filter_map(|sound| {
            let duration = as_duration(&sound["duration"]);
            if !query.accepts(duration) {
                return None;
            }
            let download_url = sound["previews"]["preview-hq-mp3"].as_str()?.to_string();
            Some(TrackCandidate {
                id: id_string(&sound["id"]),
                name: sound["name"].as_str().unwrap_or_default().to_string(),
                artist: sound["username"].as_str().unwrap_or_default().to_string(),
                duration,
                download_url,
                source: "freesound".to_string(),
                tags: string_list(&sound["tags"]),
                bpm: None,
            })
        })
        .collect()
}

// ============================================================================
// HTTP discovery
// ============================================================================

/// Jamendo + Freesound over HTTP
pub struct HttpDiscovery {
    jamendo_base_url: String,
    freesound_base_url: String,
    jamendo_client_id: Option<String>,
    freesound_api_key: Option<String>,
    music_dir: PathBuf,
    timeout_ms: u64,
}

impl HttpDiscovery {
    pub fn new(config: &MixerConfig) -> Self {
        Self {
            jamendo_base_url: config.services.jamendo_base_url.clone(),
            freesound_base_url: config.services.freesound_base_url.clone(),
            jamendo_client_id: config.services.jamendo_client_id.clone(),
            freesound_api_key: config.services.freesound_api_key.clone(),
            music_dir: config.directories.music_dir.clone(),
            timeout_ms: config.services.timeout_ms,
        }
    }

    fn search_jamendo(&self, query: &DiscoveryQuery) -> Result<Vec<TrackCandidate>> {
        let Some(client_id) = self.jamendo_client_id.as_deref() else {
            debug!("JAMENDO_CLIENT_ID not set, skipping Jamendo");
            return Ok(Vec::new());
        };
        let url = format!("{}/tracks/", self.jamendo_base_url);
        let limit = query.max_tracks.to_string();
        let params = [
            ("client_id", client_id),
            ("format", "json"),
            ("limit", limit.as_str()),
            ("search", query.query.as_str()),
            ("include", "musicinfo"),
            ("audioformat", "mp3"),
            ("audiodlformat", "mp32"),
            ("tags", "instrumental"),
        ];
        let body = self.get_json(&url, &params, None)?;
        Ok(parse_jamendo(&body, query))
    }

    fn search_freesound(&self, query: &DiscoveryQuery) -> Result<Vec<TrackCandidate>> {
        let Some(api_key) = self.freesound_api_key.as_deref() else {
            debug!("FREESOUND_API_KEY not set, skipping Freesound");
            return Ok(Vec::new());
        };
        let url = format!("{}/search/text/", self.freesound_base_url);
        let text = format!("{} music instrumental", query.query);
        let filter = format!(
            "duration:[{} TO {}] type:mp3",
            query.duration_min, query.duration_max
        );
        let page_size = query.max_tracks.to_string();
        let params = [
            ("query", text.as_str()),
            ("filter", filter.as_str()),
            ("fields", "id,name,username,duration,download,previews,tags,analysis"),
            ("page_size", page_size.as_str()),
        ];
        let auth = format!("Token {}", api_key);
        let body = self.get_json(&url, &params, Some(&auth))?;
        Ok(parse_freesound(&body, query))
    }

    #[cfg(feature = "remote")]
    fn client(&self) -> Result<reqwest::blocking::Client> {
        reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_millis(self.timeout_ms))
            .build()
            .map_err(|e| MixerError::dependency("discovery", e))
    }

    #[cfg(feature = "remote")]
    fn get_json(&self, url: &str, params: &[(&str, &str)], auth: Option<&str>) -> Result<Value> {
        let mut request = self.client()?.get(url).query(params);
        if let Some(auth) = auth {
            request = request.header("Authorization", auth);
        }
        let response = request
            .send()
            .map_err(|e| MixerError::dependency("discovery", e))?;
        if !response.status().is_success() {
            return Err(MixerError::dependency(
                "discovery",
                format!("{} returned {}", url, response.status()),
            ));
        }
        response.json().map_err(|e| MixerError::MalformedResponse {
            service: "discovery".to_string(),
            reason: e.to_string(),
        })
    }

    #[cfg(not(feature = "remote"))]
    fn get_json(&self, url: &str, _params: &[(&str, &str)], _auth: Option<&str>) -> Result<Value> {
        Err(MixerError::dependency(
            "discovery",
            format!("cannot reach {}: built without the `remote` feature", url),
        ))
    }

    #[cfg(feature = "remote")]
    fn download(&self, track: &TrackCandidate, path: &Path) -> Result<()> {
        let response = self
            .client()?
            .get(&track.download_url)
            .send()
            .map_err(|e| MixerError::dependency("download", e))?;
        if !response.status().is_success() {
            return Err(MixerError::dependency(
                "download",
                format!("{} returned {}", track.download_url, response.status()),
            ));
        }
        let bytes = response
            .bytes()
            .map_err(|e| MixerError::dependency("download", e))?;
        fs::write(path, &bytes)?;
        Ok(())
    }

    #[cfg(not(feature = "remote"))]
    fn download(&self, track: &TrackCandidate, _path: &Path) -> Result<()> {
        Err(MixerError::dependency(
            "download",
            format!(
                "cannot fetch {}: built without the `remote` feature",
                track.download_url
            ),
        ))
    }
}

impl TrackDiscovery for HttpDiscovery {
    fn discover(&self, query: &DiscoveryQuery) -> Vec<PathBuf> {
        if let Err(e) = fs::create_dir_all(&self.music_dir) {
            warn!(dir = %self.music_dir.display(), error = %e, "cannot create music directory");
            return Vec::new();
        }

        let mut candidates = self.search_jamendo(query).unwrap_or_else(|e| {
            warn!(error = %e, "Jamendo search failed");
            Vec::new()
        });
        candidates.extend(self.search_freesound(query).unwrap_or_else(|e| {
            warn!(error = %e, "Freesound search failed");
            Vec::new()
        }));
        candidates.truncate(query.max_tracks);

        let downloaded: Vec<PathBuf> = candidates
            .iter()
            .filter_map(|track| {
                let path = self.music_dir.join(track.file_name());
                match self.download(track, &path) {
                    Ok(()) => {
                        info!(path = %path.display(), source = %track.source, "downloaded");
                        Some(path)
                    }
                    Err(e) => {
                        warn!(track = %track.name, error = %e, "download failed");
                        None
                    }
                }
            })
            .collect();

        info!(query = %query.query, count = downloaded.len(), "discovery finished");
        downloaded
    }
}
