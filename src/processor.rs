//! Background removal processor
//!
//! `BackgroundRemovalProcessor` sequences one pipeline run: make sure the model is
//! compiled and loaded, encode the image, run the engine, decode and resize the
//! mask, and composite it into the alpha channel. One backend is loaded lazily
//! and reused for every call on the same processor.

use crate::{
    acquire::ModelAcquirer,
    cache::CacheLocationResolver,
    config::RemovalConfig,
    error::{BgRemovalError, Result},
    inference::{BackendFactory, InferenceBackend},
    models::MASK_OUTPUT_NAME,
    services::{
        ImageIOService, IntoRaster, NoOpProgressReporter, ProcessingStage, ProgressReporter,
    },
    tracing_config::spans,
    types::{ProcessingTimings, RemovalResult, SegmentationMask},
    utils::{Compositor, MaskCodec, TensorCodec},
};
use image::DynamicImage;
use instant::{Duration, Instant};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::Instrument;

/// Mask and timings of one engine run, before compositing
struct MaskRun {
    mask: SegmentationMask,
    inference_time: Duration,
    timings: ProcessingTimings,
}

/// Orchestrates model acquisition and the tensor pipeline
pub struct BackgroundRemovalProcessor {
    config: RemovalConfig,
    acquirer: ModelAcquirer,
    backend_factory: Box<dyn BackendFactory>,
    backend: Option<Box<dyn InferenceBackend>>,
    model_path: Option<PathBuf>,
    codec: TensorCodec,
    progress: Arc<dyn ProgressReporter>,
}

impl BackgroundRemovalProcessor {
    /// Create a processor using HTTP downloads and ONNX Runtime
    ///
    /// # Errors
    /// - Invalid configuration
    /// - Failed to create HTTP client
    #[cfg(feature = "onnx")]
    pub fn new(config: RemovalConfig) -> Result<Self> {
        let acquirer = ModelAcquirer::from_config(&config)?;
        Self::with_components(
            config,
            acquirer,
            Box::new(crate::backends::onnx::OnnxBackendFactory),
        )
    }

    /// Create a processor from explicit components
    ///
    /// # Errors
    /// - Invalid configuration
    pub fn with_components(
        config: RemovalConfig,
        acquirer: ModelAcquirer,
        backend_factory: Box<dyn BackendFactory>,
    ) -> Result<Self> {
        config.validate()?;
        let codec = TensorCodec::new(config.input_size);
        Ok(Self {
            config,
            acquirer,
            backend_factory,
            backend: None,
            model_path: None,
            codec,
            progress: Arc::new(NoOpProgressReporter),
        })
    }

    /// Receive model acquisition progress
    #[must_use]
    pub fn with_progress_reporter(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// Get the current configuration
    #[must_use]
    pub fn config(&self) -> &RemovalConfig {
        &self.config
    }

    /// Whether the backend has been loaded
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.backend.as_ref().is_some_and(|b| b.is_initialized())
    }

    /// Path of the compiled model in use, once initialized
    #[must_use]
    pub fn model_path(&self) -> Option<&Path> {
        self.model_path.as_deref()
    }

    /// Acquire the compiled model and load the backend
    ///
    /// Returns the time spent, zero when already initialized.
    ///
    /// # Errors
    /// - Acquisition errors (`CacheUnavailable`, `ModelDownloadFailed`,
    ///   `ModelCompilationFailed`)
    /// - Backend creation or model loading failures
    pub async fn initialize(&mut self) -> Result<Duration> {
        if self.is_initialized() {
            return Ok(Duration::ZERO);
        }

        let start = Instant::now();
        tracing::debug!(stage = ProcessingStage::Initialization.description());

        let cache =
            CacheLocationResolver::resolve(self.config.cache_dir.as_deref(), &self.config.repository)?;
        let model_path = self
            .acquirer
            .ensure_compiled_model(
                self.config.variant,
                &cache,
                self.config.custom_model_path.as_deref(),
                self.progress.as_ref(),
            )
            .instrument(spans::acquisition(
                &self.config.variant.to_string(),
                cache.path(),
            ))
            .await?;

        let mut backend = self.backend_factory.create_backend()?;
        let load_time = backend.initialize(&model_path, self.config.compute_profile)?;

        tracing::info!(
            backend = self.backend_factory.name(),
            model = %model_path.display(),
            load_ms = load_time.as_millis() as u64,
            "Backend initialized"
        );

        self.backend = Some(backend);
        self.model_path = Some(model_path);
        Ok(start.elapsed())
    }

    /// Remove the background of an image
    ///
    /// # Errors
    /// - `InvalidImage` when the input cannot be converted to a raster
    /// - Acquisition and backend loading errors on first use
    /// - `ImageProcessingFailed`, `Inference` or `OutputCreationFailed` from the
    ///   pipeline stages
    pub async fn process_image<I: IntoRaster>(&mut self, image: I) -> Result<RemovalResult> {
        let total_start = Instant::now();
        let image = image.into_raster()?;
        let run = self.run_mask(&image).await?;

        let composite_start = Instant::now();
        tracing::debug!(stage = ProcessingStage::BackgroundRemoval.description());
        let composited = Compositor::apply(&run.mask, &image)?;

        let mut timings = run.timings;
        timings.postprocessing_ms += composite_start.elapsed().as_millis() as u64;
        timings.total_ms = total_start.elapsed().as_millis() as u64;

        tracing::info!(
            width = image.width(),
            height = image.height(),
            inference_ms = timings.inference_ms,
            total_ms = timings.total_ms,
            "{}",
            ProcessingStage::Completed.description()
        );

        Ok(RemovalResult {
            image: composited,
            mask: run.mask,
            inference_time: run.inference_time,
            timings,
        })
    }

    /// Remove the background of an encoded image
    ///
    /// # Errors
    /// - `InvalidImage` when the bytes cannot be decoded
    /// - Any error of [`Self::process_image`]
    pub async fn process_bytes(&mut self, bytes: &[u8]) -> Result<RemovalResult> {
        self.process_image(bytes).await
    }

    /// Remove the background of an image file
    ///
    /// # Errors
    /// - File read or decode errors
    /// - Any error of [`Self::process_image`]
    pub async fn process_file<P: AsRef<Path>>(&mut self, path: P) -> Result<RemovalResult> {
        let image = ImageIOService::load_image(path)?;
        self.process_image(image).await
    }

    /// Compute only the foreground mask at the original resolution
    ///
    /// # Errors
    /// - Any error of [`Self::process_image`] except compositing
    pub async fn segment_foreground<I: IntoRaster>(&mut self, image: I) -> Result<SegmentationMask> {
        let image = image.into_raster()?;
        Ok(self.run_mask(&image).await?.mask)
    }

    /// Process images one after another
    ///
    /// The whole batch fails on the first failing image and no partial results
    /// are returned.
    ///
    /// # Errors
    /// - The first per-image error
    pub async fn process_batch<I, T>(&mut self, images: I) -> Result<Vec<RemovalResult>>
    where
        I: IntoIterator<Item = T>,
        T: IntoRaster,
    {
        let mut results = Vec::new();
        for (index, image) in images.into_iter().enumerate() {
            let result = self.process_image(image).await.map_err(|e| {
                tracing::warn!(index, error = %e, "Batch aborted");
                e
            })?;
            results.push(result);
        }
        Ok(results)
    }

    async fn run_mask(&mut self, image: &DynamicImage) -> Result<MaskRun> {
        let load_time = self.initialize().await?;
        let (width, height) = (image.width(), image.height());

        tracing::debug!(stage = ProcessingStage::Preprocessing.description(), width, height);
        let preprocess_start = Instant::now();
        let tensor = self.codec.encode(image)?;
        let preprocessing_ms = preprocess_start.elapsed().as_millis() as u64;

        let backend = self
            .backend
            .as_mut()
            .ok_or_else(|| BgRemovalError::inference("Backend not initialized"))?;

        tracing::debug!(stage = ProcessingStage::Inference.description());
        let inference_start = Instant::now();
        let outputs = spans::inference((width, height)).in_scope(|| backend.infer(&tensor))?;
        let inference_time = inference_start.elapsed();

        tracing::debug!(stage = ProcessingStage::MaskGeneration.description());
        let postprocess_start = Instant::now();
        let raw = outputs.get(MASK_OUTPUT_NAME).ok_or_else(|| {
            BgRemovalError::output_creation(format!(
                "Engine did not return output '{}'",
                MASK_OUTPUT_NAME
            ))
        })?;
        let mask = MaskCodec::decode_tensor(raw)?;
        let mask = MaskCodec::resize(&mask, width, height)?;

        Ok(MaskRun {
            mask,
            inference_time,
            timings: ProcessingTimings {
                model_load_ms: load_time.as_millis() as u64,
                preprocessing_ms,
                inference_ms: inference_time.as_millis() as u64,
                postprocessing_ms: postprocess_start.elapsed().as_millis() as u64,
                total_ms: 0,
            },
        })
    }
}
