//! Alpha compositing of a mask onto an image

use crate::error::{BgRemovalError, Result};
use crate::types::SegmentationMask;
use image::{DynamicImage, RgbaImage};

/// Writes a mask into the alpha channel of an image
pub struct Compositor;

impl Compositor {
    /// Copy `image` to RGBA and replace every alpha byte with the mask byte
    ///
    /// Color channels are left untouched. The mask is not resized here.
    ///
    /// # Errors
    /// - `ImageProcessingFailed` when mask and image dimensions differ
    /// - `OutputCreationFailed` when the mask buffer is inconsistent
    pub fn apply(mask: &SegmentationMask, image: &DynamicImage) -> Result<RgbaImage> {
        let dimensions = (image.width(), image.height());
        if mask.dimensions != dimensions {
            return Err(BgRemovalError::image_processing(format!(
                "Mask is {}x{} but image is {}x{}",
                mask.dimensions.0, mask.dimensions.1, dimensions.0, dimensions.1
            )));
        }
        if mask.data.len() != dimensions.0 as usize * dimensions.1 as usize {
            return Err(BgRemovalError::output_creation(
                "Mask data does not match its dimensions",
            ));
        }

        let mut rgba = image.to_rgba8();
        for (pixel, &alpha) in rgba.pixels_mut().zip(mask.data.iter()) {
            pixel.0[3] = alpha;
        }
        Ok(rgba)
    }
}
