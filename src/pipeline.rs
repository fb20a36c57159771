//! One capture cycle: acquire, extract features, place, log
//!
//! The pipeline owns the only [`StorageLimit`] for its storage root and runs
//! cycles strictly one after another.

use anyhow::Result;
use thiserror::Error;
use tracing::{info, warn};

use crate::capture::{AcquireError, ImageSource};
use crate::config::BucketcamConfig;
use crate::features::{
    CapturedImage, FeatureError, FeatureExtractor, FeatureSequence, LuminanceGrid,
};
use crate::logging::operations;
use crate::storage::{Placement, PlacementEngine, PlannedPlacement, StorageLimit};

#[derive(Error, Debug)]
pub enum CycleError {
    /// Transient: the image could not be fetched. Storage is untouched.
    #[error("Acquisition failed: {0}")]
    Acquire(#[from] AcquireError),

    /// The image could not be decoded. Storage is untouched.
    #[error("Feature extraction failed: {0}")]
    Features(#[from] FeatureError),

    /// A filesystem mutation failed part-way through the cycle
    #[error("Storage failed: {0:#}")]
    Storage(anyhow::Error),
}

impl CycleError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Acquire(_))
    }
}

pub struct Pipeline<E = LuminanceGrid> {
    engine: PlacementEngine,
    limit: StorageLimit,
    extractor: E,
}

impl Pipeline<LuminanceGrid> {
    /// Build the default pipeline from configuration and reconcile the counter
    pub fn from_config(config: &BucketcamConfig) -> Result<Self> {
        let extractor = LuminanceGrid::new(config.storage.depth, config.storage.fanout)?;
        Self::new(config, extractor)
    }
}

impl<E: FeatureExtractor> Pipeline<E> {
    pub fn new(config: &BucketcamConfig, extractor: E) -> Result<Self> {
        let root = config.storage.root();
        let engine = PlacementEngine::new(&root, config.storage.overflow_policy)?;
        let mut limit = StorageLimit::new(&root, config.storage.number_of_images);
        limit.reconcile()?;

        Ok(Self {
            engine,
            limit,
            extractor,
        })
    }

    pub fn engine(&self) -> &PlacementEngine {
        &self.engine
    }

    pub fn limit(&self) -> &StorageLimit {
        &self.limit
    }

    pub fn features(&self, image: &CapturedImage) -> Result<FeatureSequence, FeatureError> {
        self.extractor.extract(image)
    }

    /// Where `image` would be stored right now
    pub fn locate(
        &self,
        image: &CapturedImage,
    ) -> Result<(FeatureSequence, PlannedPlacement), FeatureError> {
        let features = self.features(image)?;
        let plan = self.engine.locate(&self.limit, &features);
        Ok((features, plan))
    }

    /// Store an already decoded image
    pub fn store(&mut self, image: &CapturedImage) -> Result<Placement, CycleError> {
        let features = self.features(image)?;
        self.engine
            .place(&mut self.limit, image.bytes(), &features)
            .map_err(CycleError::Storage)
    }

    /// Run one full cycle against `source`
    pub async fn cycle<S: ImageSource>(&mut self, source: &S) -> Result<Placement, CycleError> {
        let origin = source.describe();
        info!(operation = operations::CAPTURE, source = %origin, "Loading image");

        let data = source.fetch().await.inspect_err(|e| {
            warn!(
                operation = operations::CAPTURE,
                source = %origin,
                error = %e,
                "Acquisition failed"
            );
        })?;
        let image = CapturedImage::from_bytes(data)?;

        self.store(&image)
    }
}
