use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_downloads_directory")]
    pub downloads_directory: PathBuf,
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    /// Prefix joined with an artifact name to build the download path
    /// handed back to clients.
    #[serde(default = "default_public_prefix")]
    pub public_prefix: String,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn audiofetch_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".audiofetch")
}

fn default_downloads_directory() -> PathBuf {
    audiofetch_home().join("downloads")
}

fn default_database_path() -> PathBuf {
    crate::db::default_database_path()
        .unwrap_or_else(|| audiofetch_home().join("data").join("audiofetch.db"))
}

fn default_public_prefix() -> String {
    "/downloads".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            downloads_directory: default_downloads_directory(),
            database_path: default_database_path(),
            public_prefix: default_public_prefix(),
            cache: CacheConfig::default(),
            jobs: JobsConfig::default(),
            extraction: ExtractionConfig::default(),
            metadata: MetadataConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Sliding time-to-live of a cached artifact, measured from last access.
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    #[serde(default = "default_sweep_startup_delay_secs")]
    pub sweep_startup_delay_secs: u64,
}

fn default_cache_ttl_secs() -> u64 {
    24 * 60 * 60
}

fn default_sweep_interval_secs() -> u64 {
    60 * 60
}

fn default_sweep_startup_delay_secs() -> u64 {
    30
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn sweep_startup_delay(&self) -> Duration {
        Duration::from_secs(self.sweep_startup_delay_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            sweep_startup_delay_secs: default_sweep_startup_delay_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    /// How long a finished job record stays queryable. Running jobs never
    /// expire.
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
    #[serde(default = "default_max_concurrent_extractions")]
    pub max_concurrent_extractions: usize,
    #[serde(default = "default_max_jobs")]
    pub max_jobs: u64,
}

fn default_retention_secs() -> u64 {
    60 * 60
}

fn default_max_concurrent_extractions() -> usize {
    4
}

fn default_max_jobs() -> u64 {
    10_000
}

impl JobsConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            retention_secs: default_retention_secs(),
            max_concurrent_extractions: default_max_concurrent_extractions(),
            max_jobs: default_max_jobs(),
        }
    }
}

/// Tool options shared by the steps of one tier of the strategy ladder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TuningConfig {
    pub format_selector: String,
    pub socket_timeout_secs: u64,
    pub retries: u32,
}

impl TuningConfig {
    pub fn socket_timeout(&self) -> Duration {
        Duration::from_secs(self.socket_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    #[serde(default = "default_binary")]
    pub binary: String,
    /// Wall-clock limit for a single attempt before it is killed.
    #[serde(default = "default_attempt_timeout_secs")]
    pub attempt_timeout_secs: u64,
    #[serde(default = "default_primary_tuning")]
    pub primary: TuningConfig,
    #[serde(default = "default_primary_browser")]
    pub primary_browser: Option<String>,
    /// Exported cookie jar. Takes precedence over `primary_browser`.
    #[serde(default)]
    pub cookies_file: Option<PathBuf>,
    #[serde(default = "default_fallback_tuning")]
    pub fallback: TuningConfig,
    #[serde(default = "default_fallback_browsers")]
    pub fallback_browsers: Vec<String>,
    #[serde(default = "default_true")]
    pub anonymous_fallback: bool,
    #[serde(default = "default_true")]
    pub force_ipv4: bool,
    /// Number of trailing tool output lines kept for failure messages.
    #[serde(default = "default_diagnostic_lines")]
    pub diagnostic_lines: usize,
}

fn default_true() -> bool {
    true
}

fn default_binary() -> String {
    "yt-dlp".to_string()
}

fn default_attempt_timeout_secs() -> u64 {
    15 * 60
}

fn default_primary_tuning() -> TuningConfig {
    TuningConfig {
        format_selector: "bestaudio/best".to_string(),
        socket_timeout_secs: 30,
        retries: 3,
    }
}

fn default_primary_browser() -> Option<String> {
    Some("chrome".to_string())
}

fn default_fallback_tuning() -> TuningConfig {
    TuningConfig {
        format_selector: "bestaudio[abr<=128]/worstaudio/best".to_string(),
        socket_timeout_secs: 60,
        retries: 10,
    }
}

fn default_fallback_browsers() -> Vec<String> {
    ["firefox", "edge", "safari", "brave", "opera"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_diagnostic_lines() -> usize {
    20
}

impl ExtractionConfig {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            attempt_timeout_secs: default_attempt_timeout_secs(),
            primary: default_primary_tuning(),
            primary_browser: default_primary_browser(),
            cookies_file: None,
            fallback: default_fallback_tuning(),
            fallback_browsers: default_fallback_browsers(),
            anonymous_fallback: true,
            force_ipv4: true,
            diagnostic_lines: default_diagnostic_lines(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_oembed_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_metadata_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_oembed_endpoint() -> String {
    "https://www.youtube.com/oembed".to_string()
}

fn default_metadata_timeout_secs() -> u64 {
    10
}

impl MetadataConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: default_oembed_endpoint(),
            timeout_secs: default_metadata_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` overrides it when set.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}
