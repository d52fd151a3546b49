//! Configuration types for model acquisition and background removal

use crate::error::{BgRemovalError, Result};
use crate::models::{ModelRepository, DEFAULT_INPUT_SIZE};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Environment variable that overrides the cache root
pub const CACHE_DIR_ENV: &str = "BGREMOVE_CACHE_DIR";

/// Precision variant of the segmentation model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ModelVariant {
    /// Smaller weights, faster download
    #[default]
    Quantized,
    /// Full 32-bit weights
    #[serde(rename = "full")]
    FullPrecision,
}

impl std::fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Quantized => write!(f, "quantized"),
            Self::FullPrecision => write!(f, "full"),
        }
    }
}

impl FromStr for ModelVariant {
    type Err = BgRemovalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "quantized" | "int8" => Ok(Self::Quantized),
            "full" | "fp32" => Ok(Self::FullPrecision),
            other => Err(BgRemovalError::invalid_config(format!(
                "Unknown model variant '{}'. Expected 'quantized' or 'full'",
                other
            ))),
        }
    }
}

/// Compute-unit preference handed to the execution engine
///
/// Never influences cache paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ComputeProfile {
    /// Use the best available accelerator, falling back to CPU
    #[default]
    PreferAccelerator,
    /// CPU and GPU only
    CpuAndGpu,
    /// CPU only
    CpuOnly,
}

impl std::fmt::Display for ComputeProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PreferAccelerator => write!(f, "prefer-accelerator"),
            Self::CpuAndGpu => write!(f, "cpu-and-gpu"),
            Self::CpuOnly => write!(f, "cpu-only"),
        }
    }
}

impl FromStr for ComputeProfile {
    type Err = BgRemovalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "prefer-accelerator" | "all" | "auto" => Ok(Self::PreferAccelerator),
            "cpu-and-gpu" | "gpu" => Ok(Self::CpuAndGpu),
            "cpu-only" | "cpu" => Ok(Self::CpuOnly),
            other => Err(BgRemovalError::invalid_config(format!(
                "Unknown compute profile '{}'. Expected 'prefer-accelerator', 'cpu-and-gpu' or 'cpu-only'",
                other
            ))),
        }
    }
}

/// Configuration for acquisition and background removal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemovalConfig {
    /// Model precision variant
    pub variant: ModelVariant,

    /// Compute-unit preference for the execution engine
    pub compute_profile: ComputeProfile,

    /// Local model to use instead of the remote package
    pub custom_model_path: Option<PathBuf>,

    /// Cache root override (None = platform default)
    pub cache_dir: Option<PathBuf>,

    /// Remote source of the model packages
    pub repository: ModelRepository,

    /// Square side length of the model input tensor
    pub input_size: u32,

    /// HTTP request timeout in seconds
    pub request_timeout_secs: u64,
}

impl Default for RemovalConfig {
    fn default() -> Self {
        Self {
            variant: ModelVariant::default(),
            compute_profile: ComputeProfile::default(),
            custom_model_path: None,
            cache_dir: None,
            repository: ModelRepository::default(),
            input_size: DEFAULT_INPUT_SIZE,
            request_timeout_secs: 300,
        }
    }
}

impl RemovalConfig {
    /// Create a new configuration builder
    #[must_use]
    pub fn builder() -> RemovalConfigBuilder {
        RemovalConfigBuilder::new()
    }

    /// Validate the configuration
    ///
    /// # Errors
    /// - Input size of zero
    /// - Zero request timeout
    /// - Incomplete repository coordinates
    pub fn validate(&self) -> Result<()> {
        if self.input_size == 0 {
            return Err(BgRemovalError::invalid_config(
                "Input size must be greater than zero",
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(BgRemovalError::invalid_config(
                "Request timeout must be greater than zero",
            ));
        }
        self.repository.validate()?;
        Ok(())
    }

    /// Load configuration from a JSON file
    ///
    /// Missing fields fall back to their defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| BgRemovalError::file_io_error("read config file", path, &e))?;
        let config: Self = serde_json::from_str(&content).map_err(|e| {
            BgRemovalError::invalid_config(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides
    ///
    /// `BGREMOVE_CACHE_DIR` replaces the cache root when no explicit override is set.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if self.cache_dir.is_none() {
            if let Some(dir) = std::env::var_os(CACHE_DIR_ENV).filter(|v| !v.is_empty()) {
                tracing::debug!(cache_dir = ?dir, "Using cache directory from environment");
                self.cache_dir = Some(PathBuf::from(dir));
            }
        }
        self
    }
}

/// Builder for `RemovalConfig`
#[derive(Debug, Default)]
pub struct RemovalConfigBuilder {
    config: RemovalConfig,
}

impl RemovalConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn variant(mut self, variant: ModelVariant) -> Self {
        self.config.variant = variant;
        self
    }

    #[must_use]
    pub fn compute_profile(mut self, profile: ComputeProfile) -> Self {
        self.config.compute_profile = profile;
        self
    }

    #[must_use]
    pub fn custom_model_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.custom_model_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn cache_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.cache_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn repository(mut self, repository: ModelRepository) -> Self {
        self.config.repository = repository;
        self
    }

    #[must_use]
    pub fn input_size(mut self, size: u32) -> Self {
        self.config.input_size = size;
        self
    }

    #[must_use]
    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    /// Build the configuration
    ///
    /// # Errors
    /// - Configuration validation failures
    pub fn build(self) -> Result<RemovalConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
