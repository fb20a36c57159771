pub mod capture;
pub mod config;
pub mod history;
pub mod locate;
pub mod run;
pub mod stats;
pub mod store;

use anyhow::{Context, Result};
use std::time::Duration;

use crate::capture::HttpSource;
use crate::cli::CommonConfigArgs;
use crate::config::BucketcamConfig;
use crate::config_discovery::load_config_with_discovery;
use crate::storage::Placement;

/// Load the effective configuration: file (explicit or discovered), then CLI overrides
pub fn load_config(args: &CommonConfigArgs) -> Result<BucketcamConfig> {
    let mut config = load_config_with_discovery(args.config.as_deref())?;

    if let Some(dir) = &args.storage_dir {
        config.storage.dir = dir.clone();
    }
    if let Some(number_of_images) = args.number_of_images {
        config.storage.number_of_images = number_of_images;
    }

    Ok(config)
}

/// HTTP source for the configured camera
pub fn http_source(config: &BucketcamConfig) -> Result<HttpSource> {
    let url = config
        .source
        .url
        .as_deref()
        .context("source.url is not configured (set it in bucketcam.toml or pass --url)")?;
    let credentials = config
        .source
        .username
        .clone()
        .map(|username| (username, config.source.password.clone()));
    let timeout: Duration = config.source_timeout()?;

    HttpSource::new(url, credentials, timeout)
}

/// One-line summary of a placement for terminal output
pub fn describe_placement(placement: &Placement) -> String {
    let mut line = format!(
        "{} {} (depth {}, used {}",
        placement.action, placement.leaf.display(), placement.depth, placement.used
    );
    if placement.removed > 0 {
        line.push_str(&format!(", removed {}", placement.removed));
    }
    line.push(')');
    if let Some(evicted) = &placement.overflow_evicted {
        line.push_str(&format!(" [overflow evicted {}]", evicted.display()));
    }
    line
}
