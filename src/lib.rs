// Library interface for Bucketcam
// This allows integration tests and external code to use Bucketcam's modules

pub mod capture;
pub mod cli;
pub mod cli_utils;
pub mod commands;
pub mod config;
pub mod config_discovery;
pub mod features;
pub mod logging;
pub mod pipeline;
pub mod storage;

// Re-export commonly used types
pub use config::BucketcamConfig;
pub use features::{CapturedImage, FeatureExtractor, FeatureSequence, LuminanceGrid};
pub use pipeline::{CycleError, Pipeline};
pub use storage::{Action, OverflowPolicy, Placement, PlacementEngine, StorageLimit};
