use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Bucketcam - Limited best-effort image storage
///
/// Bucketcam periodically captures a camera image and stores it in a bucket
/// tree keyed by image features, keeping a bounded but diverse set of images.
#[derive(Parser, Debug)]
#[command(name = "bucketcam")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Limited best-effort image storage", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Common configuration arguments shared across commands
#[derive(Parser, Debug, Clone, Default)]
pub struct CommonConfigArgs {
    /// Config file path
    #[arg(short = 'c', long, env = "BUCKETCAM_CONFIG")]
    pub config: Option<String>,

    /// Storage root directory
    #[arg(long, env = "BUCKETCAM_STORAGE_DIR")]
    pub storage_dir: Option<String>,

    /// Maximum number of stored images
    #[arg(long, env = "BUCKETCAM_NUMBER_OF_IMAGES")]
    pub number_of_images: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Capture images periodically until interrupted
    Run(RunArgs),

    /// Capture and store a single image
    Capture(CaptureArgs),

    /// Store local image files as if they had been captured
    Store(StoreArgs),

    /// Show where an image would be stored, without storing it
    Locate(LocateArgs),

    /// List logged stores and whether each image is still present
    History(HistoryArgs),

    /// Show storage usage and tree shape
    Stats(StatsArgs),

    /// Configuration management utilities
    Config(ConfigArgs),
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub common: CommonConfigArgs,

    /// Snapshot URL (overrides source.url)
    #[arg(long, env = "BUCKETCAM_URL")]
    pub url: Option<String>,

    /// Time between captures, e.g. "30s", "5m" (overrides capture.interval)
    #[arg(long, env = "BUCKETCAM_INTERVAL")]
    pub interval: Option<String>,

    /// Stop after this many cycles
    #[arg(long)]
    pub max_cycles: Option<u64>,
}

#[derive(Parser, Debug)]
pub struct CaptureArgs {
    #[command(flatten)]
    pub common: CommonConfigArgs,

    /// Snapshot URL (overrides source.url)
    #[arg(long, env = "BUCKETCAM_URL")]
    pub url: Option<String>,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Parser, Debug)]
pub struct StoreArgs {
    #[command(flatten)]
    pub common: CommonConfigArgs,

    /// Image files (JPEG or PNG), stored in the given order
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Parser, Debug)]
pub struct LocateArgs {
    #[command(flatten)]
    pub common: CommonConfigArgs,

    /// Image file (JPEG or PNG)
    pub file: PathBuf,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Parser, Debug)]
pub struct HistoryArgs {
    #[command(flatten)]
    pub common: CommonConfigArgs,

    /// Only this UTC day (YYYY-MM-DD)
    #[arg(long)]
    pub date: Option<String>,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Parser, Debug)]
pub struct StatsArgs {
    #[command(flatten)]
    pub common: CommonConfigArgs,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Validate a configuration file
    Validate {
        /// Config file path
        path: String,
    },

    /// Print an example configuration
    Generate,

    /// Show the effective configuration
    Show {
        #[command(flatten)]
        common: CommonConfigArgs,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_store() {
        let cli = Cli::parse_from([
            "bucketcam",
            "store",
            "--storage-dir",
            "/tmp/images",
            "a.jpg",
            "b.png",
        ]);
        match cli.command {
            Commands::Store(args) => {
                assert_eq!(args.files.len(), 2);
                assert_eq!(args.common.storage_dir.as_deref(), Some("/tmp/images"));
                assert_eq!(args.format, OutputFormat::Text);
            }
            _ => panic!("expected store command"),
        }
    }
}
