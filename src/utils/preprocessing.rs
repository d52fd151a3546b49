//! Tensor encoding for model input
//!
//! The model consumes a `[1, 3, S, S]` float tensor. Encoding stretches the
//! image to `S x S` (no aspect-ratio padding), drops alpha, and normalizes every
//! sample with the ImageNet channel statistics. Channels are packed one after
//! another (NCHW), each in row-major pixel order.

use crate::error::{BgRemovalError, Result};
use image::imageops::FilterType;
use image::{DynamicImage, RgbaImage};
use ndarray::Array4;

/// Per-channel mean of the normalization
pub const NORMALIZATION_MEAN: [f32; 3] = [0.485, 0.456, 0.406];

/// Per-channel standard deviation of the normalization
pub const NORMALIZATION_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Normalize one 8-bit sample of channel `channel`
///
/// Returns `(sample / 255 - mean) / std`.
#[must_use]
pub fn normalize_sample(sample: u8, channel: usize) -> f32 {
    let mean = NORMALIZATION_MEAN.get(channel).copied().unwrap_or(0.0);
    let std = NORMALIZATION_STD.get(channel).copied().unwrap_or(1.0);
    (f32::from(sample) / 255.0 - mean) / std
}

/// Encodes images into the model's input tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TensorCodec {
    input_size: u32,
}

impl TensorCodec {
    /// Codec for a square model input of `input_size` pixels
    #[must_use]
    pub fn new(input_size: u32) -> Self {
        Self { input_size }
    }

    /// Side length of the encoded tensor
    #[must_use]
    pub fn input_size(&self) -> u32 {
        self.input_size
    }

    /// Resample to the model input resolution as 8-bit RGBA
    ///
    /// # Errors
    /// - `ImageProcessingFailed` for empty images or a zero input size
    pub fn resample(&self, image: &DynamicImage) -> Result<RgbaImage> {
        if self.input_size == 0 {
            return Err(BgRemovalError::image_processing(
                "Model input size must be greater than zero",
            ));
        }
        if image.width() == 0 || image.height() == 0 {
            return Err(BgRemovalError::image_processing(format!(
                "Cannot encode an empty image ({}x{})",
                image.width(),
                image.height()
            )));
        }

        let rgba = image.to_rgba8();
        if rgba.dimensions() == (self.input_size, self.input_size) {
            return Ok(rgba);
        }

        Ok(image::imageops::resize(
            &rgba,
            self.input_size,
            self.input_size,
            FilterType::Lanczos3,
        ))
    }

    /// Encode an image into a normalized `[1, 3, S, S]` tensor
    ///
    /// # Errors
    /// - `ImageProcessingFailed` when the image cannot be resampled or packed
    pub fn encode(&self, image: &DynamicImage) -> Result<Array4<f32>> {
        let resampled = self.resample(image)?;
        self.pack(&resampled)
    }

    fn pack(&self, raster: &RgbaImage) -> Result<Array4<f32>> {
        let side = self.input_size as usize;
        let plane = side * side;
        let mut values = Vec::with_capacity(3 * plane);

        for channel in 0..3 {
            values.extend(
                raster
                    .pixels()
                    .map(|pixel| normalize_sample(pixel.0[channel], channel)),
            );
        }

        Array4::from_shape_vec((1, 3, side, side), values).map_err(|e| {
            BgRemovalError::image_processing(format!("Failed to build input tensor: {}", e))
        })
    }
}
