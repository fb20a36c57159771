/// `bucketcam capture` command implementation
use anyhow::Result;

use super::{describe_placement, http_source, load_config};
use crate::cli::{CaptureArgs, OutputFormat};
use crate::cli_utils::bucketcam_prefix;
use crate::pipeline::Pipeline;

pub async fn capture(args: CaptureArgs) -> Result<()> {
    let mut config = load_config(&args.common)?;
    if let Some(url) = args.url {
        config.source.url = Some(url);
    }
    config.validate()?;

    let source = http_source(&config)?;
    let mut pipeline = Pipeline::from_config(&config)?;
    let placement = pipeline.cycle(&source).await?;

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&placement)?),
        OutputFormat::Text => {
            println!("{} {}", bucketcam_prefix(), describe_placement(&placement))
        }
    }

    Ok(())
}
