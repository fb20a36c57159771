use anyhow::Result;
use tracing::info;

use super::load_config;
use crate::cli::ConfigCommands;
use crate::config::BucketcamConfig;

pub fn run(command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Validate { path } => validate(&path),
        ConfigCommands::Generate => generate(),
        ConfigCommands::Show { common } => {
            info!("Showing effective configuration");
            let config = load_config(&common)?;

            println!("Effective Configuration:\n");
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn validate(path: &str) -> Result<()> {
    info!("Validating config file: {}", path);

    let config = BucketcamConfig::from_file(path)?;
    config.validate()?;

    println!("✓ Configuration file is valid: {}", path);
    println!("\nSummary:");
    println!("  - Storage directory: {}", config.storage.dir);
    println!("  - Number of images: {}", config.storage.number_of_images);
    println!(
        "  - Feature depth: {} (fanout {})",
        config.storage.depth, config.storage.fanout
    );
    println!(
        "  - Overflow policy: {}",
        config.storage.overflow_policy.as_str()
    );
    println!(
        "  - Source: {}",
        config.source.url.as_deref().unwrap_or("(not set)")
    );
    println!("  - Capture interval: {}", config.capture.interval);

    Ok(())
}

fn generate() -> Result<()> {
    println!("{}", BucketcamConfig::example()?);
    Ok(())
}
