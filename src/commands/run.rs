/// `bucketcam run` command implementation
///
/// Captures one image per interval until interrupted. A failed cycle is
/// logged and skipped; the loop keeps going.
use anyhow::Result;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use super::{describe_placement, http_source, load_config};
use crate::cli::RunArgs;
use crate::cli_utils::bucketcam_prefix;
use crate::pipeline::Pipeline;

pub async fn run(args: RunArgs) -> Result<()> {
    let mut config = load_config(&args.common)?;
    if let Some(url) = args.url {
        config.source.url = Some(url);
    }
    if let Some(interval) = args.interval {
        config.capture.interval = interval;
    }
    config.validate()?;

    let source = http_source(&config)?;
    let interval = config.interval()?;
    let mut pipeline = Pipeline::from_config(&config)?;

    info!(
        storage_dir = %config.storage.dir,
        capacity = config.storage.number_of_images,
        remaining = pipeline.limit().remaining(),
        interval_secs = interval.as_secs(),
        "Capture loop started"
    );

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut cycles = 0u64;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                break;
            }
        }

        match pipeline.cycle(&source).await {
            Ok(placement) => {
                println!("{} {}", bucketcam_prefix(), describe_placement(&placement));
            }
            // Already logged by the pipeline; the next tick retries
            Err(e) if e.is_transient() => {}
            Err(e) => error!(error = %e, "Capture cycle failed"),
        }

        cycles += 1;
        if args.max_cycles.is_some_and(|max| cycles >= max) {
            break;
        }
    }

    info!(cycles, used = pipeline.limit().used(), "Capture loop stopped");
    Ok(())
}
