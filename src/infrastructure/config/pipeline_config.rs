//! Pipeline configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::TimeDelta;
use color_eyre::eyre::{Result, WrapErr};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::infrastructure::http::DEFAULT_USER_AGENT;
use crate::infrastructure::image::durable_store::{
    DEFAULT_EVICTION_MARGIN, DEFAULT_FULL_CAPACITY, DEFAULT_MAX_AGE_DAYS,
    DEFAULT_THUMBNAIL_CAPACITY,
};
use crate::infrastructure::image::loader::DEFAULT_MAX_CONCURRENT;
use crate::infrastructure::image::{
    DurableStoreConfig, ImageLoaderConfig, ThumbnailDeriver, memory_cache, prefetcher, thumbnail,
};

const APP_NAME: &str = "pixelpipe";
const APP_QUALIFIER: &str = "com";
const APP_ORGANIZATION: &str = "linuxmobile";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Log level configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    #[default]
    Info,
    /// Warning level.
    Warn,
    /// Error level.
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trace => write!(f, "trace"),
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Scheduler and memory tier settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderSection {
    /// Maximum simultaneous network fetches.
    pub max_concurrent: usize,
    /// Full-size images kept in memory.
    pub memory_cache_size: usize,
    /// Thumbnails kept in memory.
    pub thumbnail_cache_size: usize,
    /// Per-request HTTP timeout in seconds.
    pub request_timeout_secs: u64,
    /// User agent for direct fetches.
    pub user_agent: String,
}

impl Default for LoaderSection {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            memory_cache_size: memory_cache::DEFAULT_FULL_CAPACITY,
            thumbnail_cache_size: memory_cache::DEFAULT_THUMBNAIL_CAPACITY,
            request_timeout_secs: 30,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Durable store settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    /// Entries older than this are treated as absent.
    pub max_age_days: i64,
    /// Entry cap for the full-image namespace.
    pub full_capacity: usize,
    /// Entry cap for the thumbnail namespace.
    pub thumbnail_capacity: usize,
    /// Extra entries removed by each eviction pass.
    pub eviction_margin: usize,
    /// Store directory. Falls back to the platform cache directory.
    pub directory: Option<PathBuf>,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            max_age_days: DEFAULT_MAX_AGE_DAYS,
            full_capacity: DEFAULT_FULL_CAPACITY,
            thumbnail_capacity: DEFAULT_THUMBNAIL_CAPACITY,
            eviction_margin: DEFAULT_EVICTION_MARGIN,
            directory: None,
        }
    }
}

/// Thumbnail encoding settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThumbnailSection {
    /// Longest edge of a derived thumbnail, in pixels.
    pub max_edge: u32,
    /// JPEG quality, 1-100.
    pub quality: u8,
}

impl Default for ThumbnailSection {
    fn default() -> Self {
        Self {
            max_edge: thumbnail::DEFAULT_MAX_EDGE,
            quality: thumbnail::DEFAULT_QUALITY,
        }
    }
}

/// Prefetch window settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrefetchSection {
    /// Items fetched on each side of the cursor.
    pub radius: usize,
}

impl Default for PrefetchSection {
    fn default() -> Self {
        Self {
            radius: prefetcher::DEFAULT_RADIUS,
        }
    }
}

/// Proxy escalation settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationSection {
    /// How long the direct attempt may run before escalating.
    pub direct_timeout_ms: u64,
}

impl Default for EscalationSection {
    fn default() -> Self {
        Self {
            direct_timeout_ms: 5000,
        }
    }
}

/// Full pipeline configuration, read from `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Log verbosity level.
    pub log_level: LogLevel,
    /// Log file path. Without one, logs go to stderr.
    pub log_path: Option<PathBuf>,
    /// Scheduler settings.
    pub loader: LoaderSection,
    /// Durable store settings.
    pub store: StoreSection,
    /// Thumbnail settings.
    pub thumbnail: ThumbnailSection,
    /// Prefetch settings.
    pub prefetch: PrefetchSection,
    /// Escalation settings.
    pub escalation: EscalationSection,
}

impl PipelineConfig {
    /// Loads configuration from `path`, or the default location when `None`.
    ///
    /// A missing file yields the defaults. A malformed file is logged and
    /// also yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path.map(Path::to_path_buf).or_else(Self::default_config_path) else {
            return Ok(Self::default());
        };

        if !path.exists() {
            info!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .wrap_err_with(|| format!("Failed to read config file {}", path.display()))?;

        match toml::from_str::<Self>(&content) {
            Ok(config) => Ok(config),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to parse config file. Using defaults.");
                Ok(Self::default())
            }
        }
    }

    /// Returns default config file path.
    #[must_use]
    pub fn default_config_path() -> Option<PathBuf> {
        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// Returns default durable store directory.
    #[must_use]
    pub fn default_store_dir() -> Option<PathBuf> {
        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.cache_dir().join("images"))
    }

    /// Returns default directory for prefetched files.
    #[must_use]
    pub fn default_download_dir() -> Option<PathBuf> {
        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.cache_dir().join("prefetch"))
    }

    /// Returns effective store directory.
    #[must_use]
    pub fn effective_store_dir(&self) -> Option<PathBuf> {
        self.store.directory.clone().or_else(Self::default_store_dir)
    }

    /// Per-request HTTP timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.loader.request_timeout_secs)
    }

    /// Time the direct attempt gets before escalation.
    #[must_use]
    pub const fn direct_timeout(&self) -> Duration {
        Duration::from_millis(self.escalation.direct_timeout_ms)
    }

    #[must_use]
    pub fn loader_config(&self) -> ImageLoaderConfig {
        ImageLoaderConfig {
            max_concurrent: self.loader.max_concurrent,
            memory_cache_size: self.loader.memory_cache_size,
            thumbnail_cache_size: self.loader.thumbnail_cache_size,
        }
    }

    /// Durable store limits. An out-of-range max age saturates, a negative
    /// one counts as zero.
    #[must_use]
    pub fn store_config(&self) -> DurableStoreConfig {
        DurableStoreConfig {
            max_age: TimeDelta::try_days(self.store.max_age_days.max(0))
                .unwrap_or(TimeDelta::MAX),
            full_capacity: self.store.full_capacity,
            thumbnail_capacity: self.store.thumbnail_capacity,
            eviction_margin: self.store.eviction_margin,
        }
    }

    #[must_use]
    pub fn thumbnail_deriver(&self) -> ThumbnailDeriver {
        ThumbnailDeriver::new(self.thumbnail.max_edge, self.thumbnail.quality)
    }
}
