//! Configuration settings for Kilde.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub api: ApiSettings,
    pub youtube: YoutubeSettings,
    pub cache: CacheSettings,
    pub rate_limit: RateLimitSettings,
    pub transcript: TranscriptSettings,
    pub fallback: FallbackSettings,
    pub library: LibrarySettings,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Directory for storing application data.
    pub data_dir: String,
    /// Directory for temporary files.
    pub temp_dir: String,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            data_dir: "~/.kilde".to_string(),
            temp_dir: "/tmp/kilde".to_string(),
            log_level: "warn".to_string(),
        }
    }
}

/// Upstream subtitle-search API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    /// API host (also sent as the `x-rapidapi-host` header).
    pub host: String,
    /// Opaque API credential. Overridden by `RAPIDAPI_KEY`.
    pub api_key: Option<String>,
    /// Per-request network timeout.
    pub timeout_seconds: u64,
    /// Attempts per request, including the first one.
    pub max_attempts: u32,
    /// Base delay for exponential retry backoff.
    pub retry_base_delay_ms: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            host: "filmot-tube-metadata-archive.p.rapidapi.com".to_string(),
            api_key: None,
            timeout_seconds: 30,
            max_attempts: 3,
            retry_base_delay_ms: 500,
        }
    }
}

impl ApiSettings {
    /// Base URL derived from the host.
    pub fn base_url(&self) -> String {
        format!("https://{}", self.host)
    }

    /// Check if an API key is configured.
    pub fn has_api_key(&self) -> bool {
        self.api_key.as_ref().is_some_and(|k| !k.is_empty())
    }
}

/// YouTube Data API settings, used to find videos too recent for the
/// subtitle index.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct YoutubeSettings {
    /// Google API key. Overridden by `YOUTUBE_API_KEY`.
    pub api_key: Option<String>,
    pub base_url: String,
    pub timeout_seconds: u64,
}

impl Default for YoutubeSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://www.googleapis.com/youtube/v3/".to_string(),
            timeout_seconds: 30,
        }
    }
}

impl YoutubeSettings {
    pub fn has_api_key(&self) -> bool {
        self.api_key.as_ref().is_some_and(|k| !k.is_empty())
    }
}

/// Response cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Enable response caching.
    pub enabled: bool,
    /// Time-to-live for cached responses.
    pub ttl_seconds: u64,
    /// Path to the SQLite cache database.
    pub path: String,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_seconds: 3600,
            path: "~/.kilde/cache.db".to_string(),
        }
    }
}

/// Token bucket settings for outbound API calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    /// Maximum burst of requests.
    pub capacity: f64,
    /// Sustained tokens per second.
    pub refill_per_second: f64,
    /// Multiplier applied to the backoff on every throttle signal.
    pub backoff_factor: f64,
    /// Upper bound for the backoff multiplier.
    pub max_backoff: f64,
    /// Consecutive successes needed before the backoff decays.
    pub recovery_successes: u32,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            capacity: 5.0,
            refill_per_second: 2.0,
            backoff_factor: 2.0,
            max_backoff: 10.0,
            recovery_successes: 3,
        }
    }
}

/// Subtitle track selection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TrackPreference {
    /// Manual subtitles preferred, auto-generated accepted.
    #[default]
    Any,
    /// Only manually created subtitles.
    Manual,
    /// Only auto-generated (ASR) subtitles.
    Auto,
}

impl std::str::FromStr for TrackPreference {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "any" => Ok(TrackPreference::Any),
            "manual" => Ok(TrackPreference::Manual),
            "auto" | "asr" => Ok(TrackPreference::Auto),
            _ => Err(format!("Unknown subtitle track: {}. Use any, manual, or auto.", s)),
        }
    }
}

impl std::fmt::Display for TrackPreference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackPreference::Any => write!(f, "any"),
            TrackPreference::Manual => write!(f, "manual"),
            TrackPreference::Auto => write!(f, "auto"),
        }
    }
}

/// Transcript fetching settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptSettings {
    /// Preferred languages, in order.
    pub languages: Vec<String>,
    /// Which subtitle track to use.
    pub track: TrackPreference,
    /// HTTP(S) proxy URL for transcript requests.
    pub proxy: Option<String>,
    /// Per-request network timeout.
    pub timeout_seconds: u64,
}

impl Default for TranscriptSettings {
    fn default() -> Self {
        Self {
            languages: vec!["en".to_string(), "en-US".to_string(), "en-GB".to_string()],
            track: TrackPreference::Any,
            proxy: None,
            timeout_seconds: 30,
        }
    }
}

/// Speech-to-text fallback settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackSettings {
    /// Transcribe audio when no subtitles are available.
    pub enabled: bool,
    /// Whisper model to use.
    pub model: String,
    /// Duration in seconds for splitting long audio files.
    pub chunk_duration_seconds: u32,
}

impl Default for FallbackSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            model: "whisper-1".to_string(),
            chunk_duration_seconds: 600,
        }
    }
}

/// Transcript library settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LibrarySettings {
    /// Skip near-duplicate transcripts on save.
    pub dedupe: bool,
    /// Compare fingerprints against every topic, not just the target one.
    pub dedupe_across_topics: bool,
    /// Characters of context on each side of a match.
    pub context_chars: usize,
    /// Structured context larger than this is written to a file.
    pub inline_context_limit: usize,
    /// Directory for exported context files.
    pub export_dir: String,
}

impl Default for LibrarySettings {
    fn default() -> Self {
        Self {
            dedupe: true,
            dedupe_across_topics: false,
            context_chars: 100,
            inline_context_limit: 20_000,
            export_dir: "~/.kilde/exports".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from the default configuration file.
    pub fn load() -> crate::error::Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    pub fn load_from(path: Option<&PathBuf>) -> crate::error::Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        let mut settings = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)?
        } else {
            Settings::default()
        };

        settings.apply_env();
        Ok(settings)
    }

    /// Apply environment overrides for credentials.
    fn apply_env(&mut self) {
        if let Ok(key) = std::env::var("RAPIDAPI_KEY") {
            if !key.is_empty() {
                self.api.api_key = Some(key);
            }
        }
        if let Ok(host) = std::env::var("RAPIDAPI_HOST") {
            if !host.is_empty() {
                self.api.host = host;
            }
        }
        if let Ok(key) = std::env::var("YOUTUBE_API_KEY") {
            if !key.is_empty() {
                self.youtube.api_key = Some(key);
            }
        }
    }

    /// Save settings to the default configuration file.
    pub fn save(&self) -> crate::error::Result<()> {
        self.save_to(&Self::default_config_path())
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::KildeError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("kilde")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    /// Get the expanded data directory path.
    pub fn data_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.data_dir)
    }

    /// Get the expanded temp directory path.
    pub fn temp_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.temp_dir)
    }

    /// Root directory of the transcript library.
    pub fn library_dir(&self) -> PathBuf {
        self.data_dir().join("transcripts")
    }

    /// Get the expanded cache database path.
    pub fn cache_path(&self) -> PathBuf {
        Self::expand_path(&self.cache.path)
    }

    /// Get the expanded export directory path.
    pub fn export_dir(&self) -> PathBuf {
        Self::expand_path(&self.library.export_dir)
    }
}
