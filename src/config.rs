use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::features::{DEFAULT_FANOUT, MAX_FANOUT, MAX_GRID_LEVELS};
use crate::storage::OverflowPolicy;

/// Complete Bucketcam configuration (loaded from TOML file)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BucketcamConfig {
    #[serde(default)]
    pub source: SourceConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub capture: CaptureConfig,
}

/// Camera image source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Snapshot URL (e.g., "http://camera.local/snapshot.jpg")
    #[serde(default)]
    pub url: Option<String>,

    /// HTTP basic auth user
    #[serde(default)]
    pub username: Option<String>,

    /// HTTP basic auth password
    #[serde(default)]
    pub password: Option<String>,

    /// Request timeout
    #[serde(default = "default_source_timeout")]
    pub timeout: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: None,
            username: None,
            password: None,
            timeout: default_source_timeout(),
        }
    }
}

/// Bucket tree storage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Storage root directory
    #[serde(default = "default_storage_dir")]
    pub dir: String,

    /// Maximum number of stored images
    #[serde(default = "default_number_of_images", alias = "numberOfImages")]
    pub number_of_images: u64,

    /// Feature sequence length (levels of the bucket tree)
    #[serde(default = "default_depth")]
    pub depth: usize,

    /// Maximum number of children per bucket directory
    #[serde(default = "default_fanout")]
    pub fanout: u32,

    /// What to do when the coarsest level overflows: evict-nearest or allow
    #[serde(default)]
    pub overflow_policy: OverflowPolicy,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: default_storage_dir(),
            number_of_images: default_number_of_images(),
            depth: default_depth(),
            fanout: default_fanout(),
            overflow_policy: OverflowPolicy::default(),
        }
    }
}

impl StorageConfig {
    pub fn root(&self) -> PathBuf {
        PathBuf::from(&self.dir)
    }
}

/// Capture loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Time between capture cycles
    #[serde(default = "default_interval")]
    pub interval: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
        }
    }
}

// Default value functions
fn default_source_timeout() -> String {
    "30s".to_string()
}

fn default_storage_dir() -> String {
    "images".to_string()
}

fn default_number_of_images() -> u64 {
    1000
}

fn default_depth() -> usize {
    5
}

fn default_fanout() -> u32 {
    DEFAULT_FANOUT
}

fn default_interval() -> String {
    "60s".to_string()
}

/// Parse a duration string (e.g., "30s", "5m", "1h", "1d"); bare numbers are seconds
pub fn parse_duration(duration_str: &str) -> Result<Duration> {
    let duration_str = duration_str.trim().to_lowercase();

    let secs = if let Some(num) = duration_str.strip_suffix('d') {
        num.trim().parse::<u64>().context("Invalid duration number")? * 24 * 60 * 60
    } else if let Some(num) = duration_str.strip_suffix('h') {
        num.trim().parse::<u64>().context("Invalid duration number")? * 60 * 60
    } else if let Some(num) = duration_str.strip_suffix('m') {
        num.trim().parse::<u64>().context("Invalid duration number")? * 60
    } else if let Some(num) = duration_str.strip_suffix('s') {
        num.trim().parse::<u64>().context("Invalid duration number")?
    } else {
        duration_str.parse().context("Invalid duration format")?
    };

    Ok(Duration::from_secs(secs))
}

impl BucketcamConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: BucketcamConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;

        Ok(config)
    }

    /// Generate example configuration as TOML string
    pub fn example() -> Result<String> {
        let config = BucketcamConfig {
            source: SourceConfig {
                url: Some("http://camera.local/cgi-bin/snapshot.jpg".to_string()),
                username: Some("viewer".to_string()),
                password: Some("change-me".to_string()),
                timeout: "30s".to_string(),
            },
            ..Default::default()
        };

        toml::to_string_pretty(&config).context("Failed to serialize example config")
    }

    pub fn interval(&self) -> Result<Duration> {
        parse_duration(&self.capture.interval)
            .with_context(|| format!("Invalid capture.interval: {}", self.capture.interval))
    }

    pub fn source_timeout(&self) -> Result<Duration> {
        parse_duration(&self.source.timeout)
            .with_context(|| format!("Invalid source.timeout: {}", self.source.timeout))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.storage.dir.is_empty() {
            anyhow::bail!("storage.dir must be set");
        }

        if self.storage.number_of_images == 0 {
            anyhow::bail!("storage.number_of_images must be at least 1");
        }

        if self.storage.depth == 0 || self.storage.depth > MAX_GRID_LEVELS {
            anyhow::bail!("storage.depth must be between 1 and {}", MAX_GRID_LEVELS);
        }

        if self.storage.fanout < 2 || self.storage.fanout > MAX_FANOUT {
            anyhow::bail!("storage.fanout must be between 2 and {}", MAX_FANOUT);
        }

        if let Some(url) = &self.source.url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                anyhow::bail!("source.url must start with http:// or https://: {}", url);
            }
        }

        if self.source.password.is_some() && self.source.username.is_none() {
            anyhow::bail!("source.password requires source.username");
        }

        let interval = self.interval()?;
        if interval.is_zero() {
            anyhow::bail!("capture.interval must be greater than zero");
        }
        self.source_timeout()?;

        Ok(())
    }
}
