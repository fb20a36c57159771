//! Feature extraction for stored images
//!
//! A [`FeatureSequence`] is the ordered, coarse-to-fine list of bucket values
//! that decides where an image lands in the storage tree. Every level is
//! bounded to `[0, fanout)` and the sequence is a pure function of the image
//! content, so the placement of an image can always be recomputed from the
//! image alone.
//!
//! The default extractor, [`LuminanceGrid`], works on 8-bit grayscale:
//! - level 0: mean luminance of the whole frame
//! - levels 1..=4: mean luminance of the 2x2 quadrants (row-major)
//! - levels 5..=20: mean luminance of the 4x4 cells (row-major)

use bytes::Bytes;
use image::{DynamicImage, GrayImage, ImageFormat};
use std::io::Cursor;
use thiserror::Error;

/// Number of levels the luminance grid can produce (1 + 4 + 16)
pub const MAX_GRID_LEVELS: usize = 21;

/// Default number of children a bucket directory may have
pub const DEFAULT_FANOUT: u32 = 1024;

/// Largest fanout accepted from configuration
pub const MAX_FANOUT: u32 = 65536;

#[derive(Error, Debug)]
pub enum FeatureError {
    #[error("Feature sequence must contain at least one level")]
    Empty,

    #[error("Feature level {index} has value {value}, expected < {fanout}")]
    OutOfRange { index: usize, value: u32, fanout: u32 },

    #[error("Unsupported feature depth {depth} (1..={max})")]
    UnsupportedDepth { depth: usize, max: usize },

    #[error("Failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
}

/// Ordered, bounded per-image discriminator values (coarse to fine)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FeatureSequence {
    levels: Vec<u32>,
}

impl FeatureSequence {
    /// Build a sequence, checking every level against `fanout`
    pub fn new(levels: Vec<u32>, fanout: u32) -> Result<Self, FeatureError> {
        if levels.is_empty() {
            return Err(FeatureError::Empty);
        }

        if let Some(index) = levels.iter().position(|&v| v >= fanout) {
            return Err(FeatureError::OutOfRange {
                index,
                value: levels[index],
                fanout,
            });
        }

        Ok(Self { levels })
    }

    pub fn levels(&self) -> &[u32] {
        &self.levels
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Deepest usable depth cursor value
    pub fn max_depth(&self) -> usize {
        self.levels.len() - 1
    }

    /// Levels `0..=depth`, or `None` when `depth` is past the end
    pub fn prefix(&self, depth: usize) -> Option<&[u32]> {
        self.levels.get(..=depth)
    }
}

/// A captured image: encoded JPEG bytes plus its grayscale pixels
#[derive(Debug, Clone)]
pub struct CapturedImage {
    bytes: Bytes,
    luma: GrayImage,
}

impl CapturedImage {
    /// Decode an encoded image. Non-JPEG input is re-encoded as JPEG so the
    /// stored leaf always matches its `.jpg` extension.
    pub fn from_bytes(bytes: Bytes) -> Result<Self, FeatureError> {
        let format = image::guess_format(&bytes)?;
        let decoded = image::load_from_memory(&bytes)?;

        let bytes = if format == ImageFormat::Jpeg {
            bytes
        } else {
            let mut encoded = Vec::new();
            DynamicImage::ImageRgb8(decoded.to_rgb8())
                .write_to(&mut Cursor::new(&mut encoded), ImageFormat::Jpeg)?;
            Bytes::from(encoded)
        };

        Ok(Self {
            bytes,
            luma: decoded.to_luma8(),
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn luma(&self) -> &GrayImage {
        &self.luma
    }
}

/// Maps an image to its feature sequence
pub trait FeatureExtractor {
    fn extract(&self, image: &CapturedImage) -> Result<FeatureSequence, FeatureError>;
}

/// Mean-luminance pyramid over a 1x1, 2x2 and 4x4 grid
#[derive(Debug, Clone)]
pub struct LuminanceGrid {
    depth: usize,
    fanout: u32,
}

impl LuminanceGrid {
    pub fn new(depth: usize, fanout: u32) -> Result<Self, FeatureError> {
        if depth == 0 || depth > MAX_GRID_LEVELS {
            return Err(FeatureError::UnsupportedDepth {
                depth,
                max: MAX_GRID_LEVELS,
            });
        }
        Ok(Self { depth, fanout })
    }

    fn scale(&self, mean: u32) -> u32 {
        // mean < 256, so the result is always below fanout
        (u64::from(mean) * u64::from(self.fanout) / 256) as u32
    }
}

impl FeatureExtractor for LuminanceGrid {
    fn extract(&self, image: &CapturedImage) -> Result<FeatureSequence, FeatureError> {
        let luma = image.luma();
        let mut levels = Vec::with_capacity(self.depth);

        'grids: for cells in [1u32, 2, 4] {
            for cy in 0..cells {
                for cx in 0..cells {
                    if levels.len() == self.depth {
                        break 'grids;
                    }
                    levels.push(self.scale(cell_mean(luma, cells, cx, cy)));
                }
            }
        }

        FeatureSequence::new(levels, self.fanout)
    }
}

/// Integer mean of one cell of an `cells x cells` grid. Every cell covers at
/// least one pixel, even for images smaller than the grid.
fn cell_mean(luma: &GrayImage, cells: u32, cx: u32, cy: u32) -> u32 {
    let (width, height) = luma.dimensions();
    if width == 0 || height == 0 {
        return 0;
    }

    let span = |index: u32, size: u32| {
        let start = index * size / cells;
        let end = ((index + 1) * size / cells).max(start + 1).min(size);
        (start, end)
    };
    let (x0, x1) = span(cx, width);
    let (y0, y1) = span(cy, height);

    let mut sum = 0u64;
    for y in y0..y1 {
        for x in x0..x1 {
            sum += u64::from(luma.get_pixel(x, y).0[0]);
        }
    }
    let count = u64::from(x1 - x0) * u64::from(y1 - y0);
    (sum / count) as u32
}
