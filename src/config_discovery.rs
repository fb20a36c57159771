use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::BucketcamConfig;

const CONFIG_FILE_NAME: &str = "bucketcam.toml";

/// Discovers Bucketcam configuration by traversing up the directory tree
pub fn discover_config(start_dir: &Path) -> Option<PathBuf> {
    let mut current = start_dir.to_path_buf();

    loop {
        let config_path = current.join(CONFIG_FILE_NAME);
        if config_path.is_file() {
            return Some(config_path);
        }

        // Try to go up one level
        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => break,
        }
    }

    // Fallback to global config
    global_config_path().filter(|path| path.is_file())
}

/// `$XDG_CONFIG_HOME/bucketcam/config.toml` (platform config dir elsewhere)
pub fn global_config_path() -> Option<PathBuf> {
    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg_config).join("bucketcam").join("config.toml"));
    }
    dirs::config_dir().map(|dir| dir.join("bucketcam").join("config.toml"))
}

/// Loads configuration with auto-discovery support
///
/// If `explicit_path` is provided, loads config from that path.
/// Otherwise, auto-discovers config by traversing up directory tree from cwd
/// and falls back to defaults when nothing is found.
pub fn load_config_with_discovery(explicit_path: Option<&str>) -> Result<BucketcamConfig> {
    if let Some(config_path) = explicit_path {
        return BucketcamConfig::from_file(config_path);
    }

    match discover_config(&std::env::current_dir()?) {
        Some(config_path) => {
            info!("Using config: {}", config_path.display());
            BucketcamConfig::from_file(&config_path)
        }
        None => {
            warn!("No configuration file found, using defaults");
            Ok(BucketcamConfig::default())
        }
    }
}
