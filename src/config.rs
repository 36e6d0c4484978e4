//! Configuration types for trackfetch

use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Cache directory and file layout settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Directory holding cached audio files (default: "./cache")
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Cache file extension and preferred audio codec (default: "opus")
    #[serde(default = "default_audio_format")]
    pub audio_format: String,

    /// Highest audio bitrate preferred when selecting a stream, in kbps (default: 192)
    #[serde(default = "default_audio_quality")]
    pub audio_quality_kbps: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            audio_format: default_audio_format(),
            audio_quality_kbps: default_audio_quality(),
        }
    }
}

/// Search and scoring settings for the resolver
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Candidates requested per query variant (default: 5)
    #[serde(default = "default_max_results")]
    pub max_results: usize,

    /// Score at which the resolver stops trying further variants (default: 80)
    #[serde(default = "default_confident_score")]
    pub confident_score: u32,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_results: default_max_results(),
            confident_score: default_confident_score(),
        }
    }
}

/// Which extraction backend performs downloads
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// External yt-dlp binary (default)
    #[default]
    YtDlp,
    /// Plain HTTP(S) download of the locator
    Http,
}

/// Fetch controller settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Extraction backend (default: yt-dlp)
    #[serde(default)]
    pub backend: BackendKind,

    /// Path to the yt-dlp executable (auto-detected if None)
    #[serde(default)]
    pub ytdlp_path: Option<PathBuf>,

    /// Whether to search PATH for yt-dlp if no explicit path is set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,

    /// Buffer percentage at which a progressive fetch is ready for playback (default: 10)
    #[serde(default = "default_min_buffer_percent")]
    pub min_buffer_percent: f32,

    /// How long a progressive caller waits for readiness (default: 30 seconds)
    #[serde(default = "default_ready_timeout", with = "duration_serde")]
    pub ready_timeout: Duration,

    /// Timeout for a single HTTP request made by the HTTP backend (default: 60 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            ytdlp_path: None,
            search_path: true,
            min_buffer_percent: default_min_buffer_percent(),
            ready_timeout: default_ready_timeout(),
            request_timeout: default_request_timeout(),
        }
    }
}

/// Playlist batch settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Number of tracks fetched in parallel per job (default: 3)
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
        }
    }
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 30 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Data storage settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// SQLite database holding the cache index and job tables (default: "./cache/trackfetch.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// Main configuration
///
/// Fields are organized into sub-configs:
/// - [`cache`](CacheConfig) - cache directory and audio format
/// - [`resolver`](ResolverConfig) - search depth and confidence threshold
/// - [`fetch`](FetchConfig) - backend selection and progressive buffering
/// - [`batch`](BatchConfig) - playlist worker pool width
/// - [`retry`](RetryConfig) - backoff for transient HTTP failures
/// - [`persistence`](PersistenceConfig) - database location
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Cache layout
    #[serde(default)]
    pub cache: CacheConfig,

    /// Resolver behavior
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// Fetch behavior
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Batch behavior
    #[serde(default)]
    pub batch: BatchConfig,

    /// Retry behavior
    #[serde(default)]
    pub retry: RetryConfig,

    /// Data storage
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

impl Config {
    /// Validate settings that serde cannot express
    pub fn validate(&self) -> crate::Result<()> {
        if self.batch.max_workers == 0 {
            return Err(crate::Error::Config {
                message: "max_workers must be at least 1".to_string(),
                key: Some("batch.max_workers".to_string()),
            });
        }
        if !(0.0..=100.0).contains(&self.fetch.min_buffer_percent) {
            return Err(crate::Error::Config {
                message: format!(
                    "min_buffer_percent must be within 0-100, got {}",
                    self.fetch.min_buffer_percent
                ),
                key: Some("fetch.min_buffer_percent".to_string()),
            });
        }
        if self.resolver.max_results == 0 {
            return Err(crate::Error::Config {
                message: "max_results must be at least 1".to_string(),
                key: Some("resolver.max_results".to_string()),
            });
        }
        if self.cache.audio_format.is_empty() || self.cache.audio_format.contains('/') {
            return Err(crate::Error::Config {
                message: format!("invalid audio format '{}'", self.cache.audio_format),
                key: Some("cache.audio_format".to_string()),
            });
        }
        Ok(())
    }
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("cache")
}

fn default_audio_format() -> String {
    "opus".to_string()
}

fn default_audio_quality() -> u32 {
    192
}

fn default_max_results() -> usize {
    5
}

fn default_confident_score() -> u32 {
    80
}

fn default_min_buffer_percent() -> f32 {
    10.0
}

fn default_ready_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_max_workers() -> usize {
    3
}

fn default_database_path() -> PathBuf {
    PathBuf::from("cache").join("trackfetch.db")
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

// Duration serialization helper (milliseconds, so sub-second timeouts survive a round trip)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
