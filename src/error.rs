//! Error types for model acquisition and background removal

use std::path::Path;
use thiserror::Error;

/// Result type alias for background removal operations
pub type Result<T> = std::result::Result<T, BgRemovalError>;

/// Error kinds raised by the acquisition and processing pipeline
///
/// Every variant is terminal for the operation that raised it; nothing in the
/// pipeline retries automatically.
#[derive(Error, Debug)]
pub enum BgRemovalError {
    /// Cache directory could not be created or accessed
    #[error("Cache unavailable: {0}")]
    CacheUnavailable(String),

    /// Transfer failed with a non-recoverable status, or every strategy failed
    #[error("Model download failed: {0}")]
    ModelDownloadFailed(String),

    /// Compiling a package into executable form failed
    #[error("Model compilation failed for '{path}': {cause}")]
    ModelCompilationFailed {
        /// Package or model path that was being compiled
        path: String,
        /// Underlying cause reported by the compiler
        cause: String,
    },

    /// Source image could not be rasterized or resized during encode
    #[error("Image processing failed: {0}")]
    ImageProcessingFailed(String),

    /// The execution engine raised an error
    #[error("Inference error: {0}")]
    Inference(String),

    /// Decoding engine output or resizing the mask failed
    #[error("Output creation failed: {0}")]
    OutputCreationFailed(String),

    /// A caller-side image handle could not be converted to a raster
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Input/output errors outside the cache and download paths
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BgRemovalError {
    pub fn cache_unavailable<S: Into<String>>(msg: S) -> Self {
        Self::CacheUnavailable(msg.into())
    }

    pub fn download_failed<S: Into<String>>(msg: S) -> Self {
        Self::ModelDownloadFailed(msg.into())
    }

    pub fn compilation_failed<P: AsRef<Path>, S: Into<String>>(path: P, cause: S) -> Self {
        Self::ModelCompilationFailed {
            path: path.as_ref().display().to_string(),
            cause: cause.into(),
        }
    }

    pub fn image_processing<S: Into<String>>(msg: S) -> Self {
        Self::ImageProcessingFailed(msg.into())
    }

    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::Inference(msg.into())
    }

    pub fn output_creation<S: Into<String>>(msg: S) -> Self {
        Self::OutputCreationFailed(msg.into())
    }

    pub fn invalid_image<S: Into<String>>(msg: S) -> Self {
        Self::InvalidImage(msg.into())
    }

    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<Path>>(operation: &str, path: P, error: &std::io::Error) -> Self {
        Self::Io(std::io::Error::new(
            error.kind(),
            format!(
                "Failed to {} '{}': {}",
                operation,
                path.as_ref().display(),
                error
            ),
        ))
    }

    /// Create a cache error with operation context
    pub fn cache_io_error<P: AsRef<Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        Self::CacheUnavailable(format!(
            "Failed to {} '{}': {}",
            operation,
            path.as_ref().display(),
            error
        ))
    }

    /// Create a download error for a specific URL and HTTP status
    pub fn http_status_error(url: &str, status: u16) -> Self {
        Self::ModelDownloadFailed(format!("HTTP {} for {}", status, url))
    }

    /// Whether this error kind belongs to model acquisition rather than processing
    #[must_use]
    pub fn is_acquisition_error(&self) -> bool {
        matches!(
            self,
            Self::CacheUnavailable(_)
                | Self::ModelDownloadFailed(_)
                | Self::ModelCompilationFailed { .. }
        )
    }
}
