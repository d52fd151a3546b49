//! Mask decoding and resizing
//!
//! The engine already applies the activation, so its output is a foreground
//! probability per pixel. Values are clamped to `[0, 1]` before scaling to bytes.

use crate::error::{BgRemovalError, Result};
use crate::types::SegmentationMask;
use image::imageops::FilterType;
use ndarray::Array4;

/// Convert a probability to a grayscale byte
///
/// Out-of-range values saturate; NaN maps to 0.
#[must_use]
pub fn probability_to_byte(value: f32) -> u8 {
    if value.is_nan() {
        return 0;
    }
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Decodes engine output into masks
pub struct MaskCodec;

impl MaskCodec {
    /// Decode a square row-major output channel of side `side`
    ///
    /// # Errors
    /// - `OutputCreationFailed` when `raw` does not hold `side * side` values
    pub fn decode(raw: &[f32], side: u32) -> Result<SegmentationMask> {
        Self::decode_rect(raw, side, side)
    }

    /// Decode a row-major output channel of `width x height`
    ///
    /// # Errors
    /// - `OutputCreationFailed` when the length does not match the dimensions
    pub fn decode_rect(raw: &[f32], width: u32, height: u32) -> Result<SegmentationMask> {
        let expected = width as usize * height as usize;
        if raw.len() != expected {
            return Err(BgRemovalError::output_creation(format!(
                "Engine output has {} values, expected {} for {}x{}",
                raw.len(),
                expected,
                width,
                height
            )));
        }

        let data = raw.iter().copied().map(probability_to_byte).collect();
        SegmentationMask::new(data, (width, height))
    }

    /// Decode the first channel of a `[1, C, H, W]` output tensor
    ///
    /// # Errors
    /// - `OutputCreationFailed` for an empty batch or channel dimension
    pub fn decode_tensor(tensor: &Array4<f32>) -> Result<SegmentationMask> {
        let (batch, channels, height, width) = tensor.dim();
        if batch == 0 || channels == 0 {
            return Err(BgRemovalError::output_creation(format!(
                "Engine output tensor has no mask channel: shape {:?}",
                tensor.shape()
            )));
        }

        let values: Vec<f32> = tensor
            .slice(ndarray::s![0, 0, .., ..])
            .iter()
            .copied()
            .collect();

        let width = u32::try_from(width)
            .map_err(|_| BgRemovalError::output_creation("Mask width out of range"))?;
        let height = u32::try_from(height)
            .map_err(|_| BgRemovalError::output_creation("Mask height out of range"))?;
        Self::decode_rect(&values, width, height)
    }

    /// Resize a mask to `width x height` with Lanczos resampling
    ///
    /// Aspect ratio is not preserved.
    ///
    /// # Errors
    /// - `OutputCreationFailed` for a zero target dimension or a corrupt mask
    pub fn resize(mask: &SegmentationMask, width: u32, height: u32) -> Result<SegmentationMask> {
        if width == 0 || height == 0 {
            return Err(BgRemovalError::output_creation(format!(
                "Cannot resize mask to {}x{}",
                width, height
            )));
        }
        if mask.dimensions == (width, height) {
            return Ok(mask.clone());
        }

        let image = mask.to_image()?;
        let resized = image::imageops::resize(&image, width, height, FilterType::Lanczos3);
        Ok(SegmentationMask::from_image(&resized))
    }
}
