#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]

//! # IMG.LY Background Removal Pipeline
//!
//! Background removal with a `BiRefNet` segmentation model, including managed
//! model acquisition.
//!
//! The model is distributed as a portable package (`<stem>.modelpkg`) which is
//! downloaded once, compiled into a platform-specific artifact (`<stem>.ort`)
//! and kept in a per-user cache. Every later run loads the compiled artifact
//! directly.
//!
//! ## Features
//!
//! - **Two Variants**: quantized (default) and full-precision `fp32`
//! - **Managed Cache**: download, extraction and compilation happen at most once
//!   per cache root, even with concurrent callers in the same process
//! - **Deterministic Codecs**: fixed-size normalized input tensor, probability
//!   mask decoded and resized back to the original resolution
//! - **Hardware Acceleration**: `CoreML` and CUDA execution providers through ONNX Runtime
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use imgly_bgremove_pipeline::{remove_background_from_bytes, ModelVariant, RemovalConfig};
//!
//! # async fn example(upload: Vec<u8>) -> anyhow::Result<()> {
//! let config = RemovalConfig::builder()
//!     .variant(ModelVariant::Quantized)
//!     .build()?;
//! let result = remove_background_from_bytes(&upload, &config).await?;
//! result.save_png("output.png")?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Reusing a processor
//!
//! The helpers above build a fresh processor per call. Keep a
//! [`BackgroundRemovalProcessor`] around to load the model only once:
//!
//! ```rust,no_run
//! use imgly_bgremove_pipeline::{BackgroundRemovalProcessor, RemovalConfig};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = RemovalConfig::default().with_env_overrides();
//! let mut processor = BackgroundRemovalProcessor::new(config)?;
//! for path in ["a.jpg", "b.jpg"] {
//!     let result = processor.process_file(path).await?;
//!     println!("{}", result.timing_summary());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `onnx` (default): ONNX Runtime engine and model compiler
//! - `tracing-json`: JSON output for [`TracingConfig`]

pub mod acquire;
pub mod archive;
pub mod backends;
pub mod cache;
pub mod compile;
pub mod config;
pub mod download;
pub mod error;
pub mod inference;
pub mod models;
pub mod processor;
pub mod services;
pub mod tracing_config;
pub mod types;
pub mod utils;

use std::path::Path;

// Public API exports
pub use acquire::{ModelAcquirer, SingleFlight};
pub use archive::{ArchiveExtractor, ZipExtractor};
#[cfg(feature = "onnx")]
pub use backends::{OnnxBackend, OnnxBackendFactory, OnnxCompiler};
pub use cache::{
    format_size, ArtifactKind, CacheLocationResolver, CacheRoot, CachedArtifactInfo, ClearOutcome,
};
pub use compile::ModelCompiler;
pub use config::{ComputeProfile, ModelVariant, RemovalConfig, RemovalConfigBuilder};
pub use download::{ArtifactTransport, DownloadStrategy, FetchOutcome, HttpTransport, ModelDownloader};
pub use error::{BgRemovalError, Result};
pub use inference::{BackendFactory, EngineOutputs, InferenceBackend};
pub use models::{ArtifactState, ModelRepository, PackageManifest};
pub use processor::BackgroundRemovalProcessor;
pub use services::{
    AcquisitionStage, ImageIOService, IntoRaster, NoOpProgressReporter, ProcessingStage,
    ProgressReporter, ProgressTracker, TracingProgressReporter,
};
pub use tracing_config::{init_library_tracing, spans, TracingConfig, TracingFormat};
pub use types::{MaskStatistics, ProcessingTimings, RemovalResult, SegmentationMask};
pub use utils::{Compositor, MaskCodec, TensorCodec};

/// Remove the background of an in-memory image
///
/// Acquires the model on first use (download and compilation), then runs the
/// full pipeline once.
///
/// # Examples
///
/// ```rust,no_run
/// use imgly_bgremove_pipeline::{remove_background_from_image, RemovalConfig};
/// use image::DynamicImage;
///
/// # async fn example(img: DynamicImage) -> anyhow::Result<()> {
/// let result = remove_background_from_image(img, &RemovalConfig::default()).await?;
/// result.save_png("output.png")?;
/// # Ok(())
/// # }
/// ```
#[cfg(feature = "onnx")]
pub async fn remove_background_from_image<I: IntoRaster>(
    image: I,
    config: &RemovalConfig,
) -> Result<RemovalResult> {
    let mut processor = BackgroundRemovalProcessor::new(config.clone())?;
    processor.process_image(image).await
}

/// Remove the background of an encoded image (PNG, JPEG, TIFF)
///
/// # Examples
///
/// ```rust,no_run
/// use imgly_bgremove_pipeline::{remove_background_from_bytes, RemovalConfig};
///
/// # async fn example(upload_bytes: Vec<u8>) -> anyhow::Result<()> {
/// let result = remove_background_from_bytes(&upload_bytes, &RemovalConfig::default()).await?;
/// let png = result.to_png_bytes()?;
/// # Ok(())
/// # }
/// ```
#[cfg(feature = "onnx")]
pub async fn remove_background_from_bytes(
    image_bytes: &[u8],
    config: &RemovalConfig,
) -> Result<RemovalResult> {
    remove_background_from_image(image_bytes, config).await
}

/// Delete the model cache
///
/// Uses `override_dir` when given, otherwise the default location for
/// `repository`. The directory is never created just to be deleted.
///
/// # Errors
/// - `CacheUnavailable` when the platform cache directory is unknown or
///   removal fails
pub fn clear_cache(
    override_dir: Option<&Path>,
    repository: &ModelRepository,
) -> Result<ClearOutcome> {
    let path = match override_dir {
        Some(dir) => dir.to_path_buf(),
        None => {
            let platform_root = dirs::cache_dir().ok_or_else(|| {
                BgRemovalError::cache_unavailable("Failed to determine platform cache directory")
            })?;
            CacheLocationResolver::default_cache_path(
                &platform_root,
                &repository.organization,
                &repository.repository,
            )
        },
    };
    cache::clear_cache_dir(&path)
}
