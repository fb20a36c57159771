/// `bucketcam locate` command implementation
///
/// Runs the placement decision for an image without mutating storage.
use anyhow::{Context, Result};
use bytes::Bytes;
use serde_json::json;

use super::load_config;
use crate::cli::{LocateArgs, OutputFormat};
use crate::features::CapturedImage;
use crate::pipeline::Pipeline;
use crate::storage::{hash_bytes, hash_file, Occupancy};

pub fn locate(args: LocateArgs) -> Result<()> {
    let config = load_config(&args.common)?;
    config.validate()?;

    let data = std::fs::read(&args.file)
        .with_context(|| format!("Failed to read image: {}", args.file.display()))?;
    let image = CapturedImage::from_bytes(Bytes::from(data))
        .with_context(|| format!("Failed to decode image: {}", args.file.display()))?;

    let pipeline = Pipeline::from_config(&config)?;
    let (features, plan) = pipeline.locate(&image)?;

    let leaf = plan.target.leaf_file();
    let occupancy = Occupancy::probe(&plan.target);
    // Whether this exact image is what the leaf holds now
    let stored = occupancy == Occupancy::Leaf && hash_file(&leaf)? == hash_bytes(image.bytes());

    match args.format {
        OutputFormat::Json => {
            let report = json!({
                "features": features.levels(),
                "target": plan.target.relative_leaf(),
                "depth": plan.target.depth(),
                "frontier": plan.frontier,
                "action": plan.action,
                "occupancy": occupancy.as_str(),
                "overflow": plan.overflow,
                "already_stored": stored,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Text => {
            println!("Image: {}", args.file.display());
            println!("Features: {:?}", features.levels());
            println!(
                "Target: {} (depth {})",
                plan.target.relative_leaf().display(),
                plan.target.depth()
            );
            println!("Action: {}", plan.action);
            println!("Current occupant: {}", occupancy.as_str());
            if plan.overflow {
                println!("Note: storing would exceed capacity at the coarsest level");
            }
            if stored {
                println!("Status: already stored ✓");
            }
        }
    }

    Ok(())
}
