//! Core types for background removal results

use crate::error::{BgRemovalError, Result};
use image::{DynamicImage, GrayImage, ImageFormat, RgbaImage};
use instant::Duration;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::path::Path;

/// Result of a background removal operation
#[derive(Debug, Clone)]
pub struct RemovalResult {
    /// Source colors with the mask as alpha channel, at the original resolution
    pub image: RgbaImage,

    /// The segmentation mask used for removal, at the original resolution
    pub mask: SegmentationMask,

    /// Time spent inside the execution engine only
    pub inference_time: Duration,

    /// Per-stage timing breakdown
    pub timings: ProcessingTimings,
}

impl RemovalResult {
    /// Original image dimensions
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Save the result as PNG with alpha channel
    ///
    /// # Errors
    /// - `OutputCreationFailed` when encoding or writing fails
    pub fn save_png<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        self.image
            .save_with_format(path, ImageFormat::Png)
            .map_err(|e| save_error(path, &e))
    }

    /// Encode the result as PNG bytes
    ///
    /// # Errors
    /// - `OutputCreationFailed` when encoding fails
    pub fn to_png_bytes(&self) -> Result<Vec<u8>> {
        let mut buffer = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(self.image.clone())
            .write_to(&mut buffer, ImageFormat::Png)
            .map_err(|e| BgRemovalError::output_creation(format!("Failed to encode PNG: {}", e)))?;
        Ok(buffer.into_inner())
    }

    /// Human-readable timing summary
    #[must_use]
    pub fn timing_summary(&self) -> String {
        let t = &self.timings;
        format!(
            "Total: {}ms | Model: {}ms | Preprocessing: {}ms | Inference: {}ms | Postprocessing: {}ms",
            t.total_ms, t.model_load_ms, t.preprocessing_ms, t.inference_ms, t.postprocessing_ms
        )
    }
}

/// Single-channel 8-bit segmentation mask, row-major
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentationMask {
    /// Mask data as grayscale values (0-255)
    pub data: Vec<u8>,

    /// Mask dimensions (width, height)
    pub dimensions: (u32, u32),
}

impl SegmentationMask {
    /// Create a mask from raw row-major data
    ///
    /// # Errors
    /// - `OutputCreationFailed` when the data length does not match the dimensions
    pub fn new(data: Vec<u8>, dimensions: (u32, u32)) -> Result<Self> {
        let expected = dimensions.0 as usize * dimensions.1 as usize;
        if data.len() != expected {
            return Err(BgRemovalError::output_creation(format!(
                "Mask data has {} values, expected {} for {}x{}",
                data.len(),
                expected,
                dimensions.0,
                dimensions.1
            )));
        }
        Ok(Self { data, dimensions })
    }

    /// Create mask from a grayscale image
    #[must_use]
    pub fn from_image(image: &GrayImage) -> Self {
        Self {
            dimensions: image.dimensions(),
            data: image.as_raw().clone(),
        }
    }

    /// Convert mask to a grayscale image
    ///
    /// # Errors
    /// - `OutputCreationFailed` when the buffer does not match the dimensions
    pub fn to_image(&self) -> Result<GrayImage> {
        let (width, height) = self.dimensions;
        GrayImage::from_raw(width, height, self.data.clone()).ok_or_else(|| {
            BgRemovalError::output_creation("Failed to create image from mask data")
        })
    }

    /// Mask width
    #[must_use]
    pub fn width(&self) -> u32 {
        self.dimensions.0
    }

    /// Mask height
    #[must_use]
    pub fn height(&self) -> u32 {
        self.dimensions.1
    }

    /// Get mask statistics
    #[must_use]
    pub fn statistics(&self) -> MaskStatistics {
        let total_pixels = self.data.len();
        let foreground_pixels = self.data.iter().filter(|&&x| x > 127).count();
        let background_pixels = total_pixels - foreground_pixels;
        let ratio = |count: usize| {
            if total_pixels == 0 {
                0.0
            } else {
                count as f32 / total_pixels as f32
            }
        };

        MaskStatistics {
            total_pixels,
            foreground_pixels,
            background_pixels,
            foreground_ratio: ratio(foreground_pixels),
            background_ratio: ratio(background_pixels),
        }
    }

    /// Save mask as PNG
    ///
    /// # Errors
    /// - `OutputCreationFailed` when encoding or writing fails
    pub fn save_png<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        self.to_image()?
            .save_with_format(path, ImageFormat::Png)
            .map_err(|e| save_error(path, &e))
    }
}

/// Statistics about a segmentation mask
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskStatistics {
    pub total_pixels: usize,
    pub foreground_pixels: usize,
    pub background_pixels: usize,
    pub foreground_ratio: f32,
    pub background_ratio: f32,
}

/// Timing breakdown for one pipeline run, in milliseconds
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingTimings {
    /// Model acquisition and backend loading (zero once loaded)
    pub model_load_ms: u64,

    /// Tensor encoding
    pub preprocessing_ms: u64,

    /// Execution engine invocation
    pub inference_ms: u64,

    /// Mask decoding, resizing and compositing
    pub postprocessing_ms: u64,

    /// Whole pipeline
    pub total_ms: u64,
}

fn save_error(path: &Path, error: &image::ImageError) -> BgRemovalError {
    BgRemovalError::output_creation(format!("Failed to save '{}': {}", path.display(), error))
}
