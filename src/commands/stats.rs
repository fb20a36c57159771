/// `bucketcam stats` command implementation
use anyhow::Result;
use serde_json::json;

use super::load_config;
use crate::cli::{OutputFormat, StatsArgs};
use crate::storage::{list_log_files, tree_stats};

pub fn stats(args: StatsArgs) -> Result<()> {
    let config = load_config(&args.common)?;
    let root = config.storage.root();

    let tree = tree_stats(&root)?;
    let logs = list_log_files(&root)?;
    let capacity = config.storage.number_of_images;

    match args.format {
        OutputFormat::Json => {
            let report = json!({
                "storage_dir": tree.storage_dir,
                "used": tree.leaves,
                "capacity": capacity,
                "branches": tree.branches,
                "total_bytes": tree.total_bytes,
                "max_depth": tree.max_depth,
                "leaves_per_depth": tree.leaves_per_depth,
                "log_files": logs.len(),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Text => {
            println!("Bucketcam Storage Statistics");
            println!();
            println!("Storage directory: {}", tree.storage_dir.display());
            println!("Stored images: {} / {}", tree.leaves, capacity);
            if tree.leaves > capacity {
                println!("  (above capacity by {})", tree.leaves - capacity);
            }
            println!("Branches: {}", tree.branches);
            println!(
                "Total size: {:.2} MB",
                tree.total_bytes as f64 / 1_000_000.0
            );
            if tree.leaves > 0 {
                println!("Deepest leaf: depth {}", tree.max_depth);
                for (depth, count) in tree.leaves_per_depth.iter().enumerate() {
                    println!("  depth {}: {} images", depth, count);
                }
            }
            println!("Log files: {}", logs.len());
        }
    }

    Ok(())
}
