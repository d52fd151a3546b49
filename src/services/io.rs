//! Image I/O operations service
//!
//! This module separates file I/O and image-handle conversion from business
//! logic. Everything the pipeline accepts goes through [`IntoRaster`], the single
//! conversion point from caller-side image representations to a generic raster.

use crate::error::{BgRemovalError, Result};
use image::{DynamicImage, ImageFormat, RgbImage, RgbaImage};
use std::path::Path;

/// Conversion of a caller-side image handle into a generic raster
pub trait IntoRaster {
    /// Produce the raster
    ///
    /// # Errors
    /// - `InvalidImage` when the handle cannot be converted
    fn into_raster(self) -> Result<DynamicImage>;
}

impl IntoRaster for DynamicImage {
    fn into_raster(self) -> Result<DynamicImage> {
        Ok(self)
    }
}

impl IntoRaster for &DynamicImage {
    fn into_raster(self) -> Result<DynamicImage> {
        Ok(self.clone())
    }
}

impl IntoRaster for RgbaImage {
    fn into_raster(self) -> Result<DynamicImage> {
        Ok(DynamicImage::ImageRgba8(self))
    }
}

impl IntoRaster for RgbImage {
    fn into_raster(self) -> Result<DynamicImage> {
        Ok(DynamicImage::ImageRgb8(self))
    }
}

impl IntoRaster for &[u8] {
    fn into_raster(self) -> Result<DynamicImage> {
        image::load_from_memory(self).map_err(|e| {
            BgRemovalError::invalid_image(format!("Failed to decode image from bytes: {}", e))
        })
    }
}

impl IntoRaster for Vec<u8> {
    fn into_raster(self) -> Result<DynamicImage> {
        self.as_slice().into_raster()
    }
}

/// Service for handling image file input/output operations
pub struct ImageIOService;

impl ImageIOService {
    /// Load an image from a file path
    ///
    /// Falls back to content-based format detection when the extension is wrong.
    ///
    /// # Errors
    /// - I/O error when the file does not exist or cannot be read
    /// - `InvalidImage` when the content cannot be decoded
    pub fn load_image<P: AsRef<Path>>(path: P) -> Result<DynamicImage> {
        let path_ref = path.as_ref();

        if !path_ref.exists() {
            return Err(BgRemovalError::file_io_error(
                "read image file",
                path_ref,
                &std::io::Error::new(std::io::ErrorKind::NotFound, "file does not exist"),
            ));
        }

        match image::open(path_ref) {
            Ok(img) => Ok(img),
            Err(e) => {
                tracing::debug!(
                    path = %path_ref.display(),
                    error = %e,
                    "Extension-based loading failed, attempting content-based detection"
                );

                let data = std::fs::read(path_ref).map_err(|io_err| {
                    BgRemovalError::file_io_error("read image data", path_ref, &io_err)
                })?;

                image::load_from_memory(&data).map_err(|content_err| {
                    BgRemovalError::invalid_image(format!(
                        "Failed to load image '{}': {}",
                        path_ref.display(),
                        content_err
                    ))
                })
            },
        }
    }

    /// Load an image from bytes
    ///
    /// # Errors
    /// - `InvalidImage` when the bytes cannot be decoded
    pub fn load_from_bytes(bytes: &[u8]) -> Result<DynamicImage> {
        bytes.into_raster()
    }

    /// Load an image from an async reader
    ///
    /// # Errors
    /// - I/O error while reading the stream
    /// - `InvalidImage` when the data cannot be decoded
    pub async fn load_from_reader<R: tokio::io::AsyncRead + Unpin>(
        mut reader: R,
    ) -> Result<DynamicImage> {
        use tokio::io::AsyncReadExt;

        let mut buffer = Vec::new();
        reader.read_to_end(&mut buffer).await?;
        Self::load_from_bytes(&buffer)
    }

    /// Save an RGBA image as PNG, creating parent directories
    ///
    /// # Errors
    /// - I/O error when the output directory cannot be created
    /// - `OutputCreationFailed` when encoding or writing fails
    pub fn save_png<P: AsRef<Path>>(image: &RgbaImage, path: P) -> Result<()> {
        let path_ref = path.as_ref();

        if let Some(parent) = path_ref.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                BgRemovalError::file_io_error("create output directory", parent, &e)
            })?;
        }

        image
            .save_with_format(path_ref, ImageFormat::Png)
            .map_err(|e| {
                BgRemovalError::output_creation(format!(
                    "Failed to save '{}': {}",
                    path_ref.display(),
                    e
                ))
            })
    }

    /// Check if a file path has a supported image extension
    pub fn is_supported_format<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                matches!(
                    ext.to_lowercase().as_str(),
                    "jpg" | "jpeg" | "png" | "tiff" | "tif"
                )
            })
    }
}
