/// `bucketcam store` command implementation
///
/// Places local image files exactly as captured images would be placed.
use anyhow::{Context, Result};

use super::{describe_placement, load_config};
use crate::capture::FileSource;
use crate::cli::{OutputFormat, StoreArgs};
use crate::cli_utils::bucketcam_prefix;
use crate::pipeline::Pipeline;

pub async fn store(args: StoreArgs) -> Result<()> {
    let config = load_config(&args.common)?;
    config.validate()?;

    let mut pipeline = Pipeline::from_config(&config)?;
    let mut placements = Vec::with_capacity(args.files.len());

    for file in &args.files {
        let placement = pipeline
            .cycle(&FileSource::new(file))
            .await
            .with_context(|| format!("Failed to store {}", file.display()))?;

        if args.format == OutputFormat::Text {
            println!(
                "{} {} -> {}",
                bucketcam_prefix(),
                file.display(),
                describe_placement(&placement)
            );
        }
        placements.push(placement);
    }

    if args.format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&placements)?);
    }

    Ok(())
}
