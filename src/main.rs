use anyhow::Result;
use clap::Parser;

use bucketcam::cli::{Cli, Commands};
use bucketcam::{commands, logging};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured logging
    logging::init();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Dispatch to appropriate command handler
    match cli.command {
        Commands::Run(args) => commands::run::run(args).await,
        Commands::Capture(args) => commands::capture::capture(args).await,
        Commands::Store(args) => commands::store::store(args).await,
        Commands::Locate(args) => commands::locate::locate(args),
        Commands::History(args) => commands::history::history(args),
        Commands::Stats(args) => commands::stats::stats(args),
        Commands::Config(args) => commands::config::run(args.command),
    }
}
