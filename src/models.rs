//! Model family description: variants, artifact names, package layout and remote source
//!
//! A model is distributed as a *package*: a directory holding a manifest, the
//! primary graph file and an optional external weights file. Compiling a package
//! produces a single optimized artifact (`.ort`) that the execution engine loads
//! directly. Both live side by side in the cache root under names derived from
//! the variant.

use crate::config::ModelVariant;
use crate::error::{BgRemovalError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Model family identifier used in artifact names
pub const MODEL_FAMILY: &str = "birefnet";

/// Extension of package directories
pub const PACKAGE_EXTENSION: &str = "modelpkg";

/// Extension that marks an already compiled artifact
pub const COMPILED_EXTENSION: &str = "ort";

/// Square side length of the model input
pub const DEFAULT_INPUT_SIZE: u32 = 1024;

/// Name of the input tensor
pub const INPUT_TENSOR_NAME: &str = "input_image";

/// Name of the full-resolution mask output
pub const MASK_OUTPUT_NAME: &str = "output_image";

/// Manifest path inside a package
pub const MANIFEST_PATH: &str = "Manifest.json";

/// Primary graph path inside a package
pub const PRIMARY_WEIGHTS_PATH: &str = "Data/model.onnx";

/// Optional external weights path inside a package
pub const SECONDARY_WEIGHTS_PATH: &str = "Data/weights/weight.bin";

/// A file that makes up a package
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackageFile {
    /// Path relative to the package root
    pub path: &'static str,
    /// Whether the package is incomplete without it
    pub required: bool,
}

/// Files fetched individually when the bulk archive is unavailable
pub const PACKAGE_FILES: &[PackageFile] = &[
    PackageFile {
        path: MANIFEST_PATH,
        required: true,
    },
    PackageFile {
        path: PRIMARY_WEIGHTS_PATH,
        required: true,
    },
    PackageFile {
        path: SECONDARY_WEIGHTS_PATH,
        required: false,
    },
];

impl ModelVariant {
    /// Stem shared by every artifact of this variant
    #[must_use]
    pub fn file_stem(self) -> &'static str {
        match self {
            Self::Quantized => "birefnet_quantized",
            Self::FullPrecision => "birefnet_fp32",
        }
    }

    /// Directory name of the uncompiled package
    #[must_use]
    pub fn package_file_name(self) -> String {
        format!("{}.{}", self.file_stem(), PACKAGE_EXTENSION)
    }

    /// File name of the compiled artifact
    #[must_use]
    pub fn compiled_file_name(self) -> String {
        format!("{}.{}", self.file_stem(), COMPILED_EXTENSION)
    }

    /// File name of the remote bulk archive
    #[must_use]
    pub fn archive_file_name(self) -> String {
        format!("{}.zip", self.package_file_name())
    }
}

/// On-disk state of a variant's artifact inside a cache root
///
/// Derived from existence checks only; nothing is persisted. A compiled artifact
/// takes precedence over a package that may still sit next to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ArtifactState {
    Missing,
    PackagePresent,
    CompiledPresent,
}

impl ArtifactState {
    /// Determine the state from the two well-known paths
    #[must_use]
    pub fn probe(package_path: &Path, compiled_path: &Path) -> Self {
        if compiled_path.exists() {
            Self::CompiledPresent
        } else if package_path.exists() {
            Self::PackagePresent
        } else {
            Self::Missing
        }
    }
}

/// Whether a path already points at a compiled artifact
#[must_use]
pub fn is_compiled_artifact(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(COMPILED_EXTENSION))
}

/// Remote location of the model packages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelRepository {
    /// Base URL of the hosting service
    pub base_url: String,
    /// Organization owning the repository
    pub organization: String,
    /// Repository name
    pub repository: String,
}

impl Default for ModelRepository {
    fn default() -> Self {
        Self {
            base_url: "https://huggingface.co".to_string(),
            organization: "imgly".to_string(),
            repository: "background-removal-models".to_string(),
        }
    }
}

impl ModelRepository {
    /// Create a repository description
    pub fn new<B, O, R>(base_url: B, organization: O, repository: R) -> Self
    where
        B: Into<String>,
        O: Into<String>,
        R: Into<String>,
    {
        Self {
            base_url: base_url.into(),
            organization: organization.into(),
            repository: repository.into(),
        }
    }

    /// Validate the repository coordinates
    ///
    /// # Errors
    /// - Empty base URL, organization or repository
    /// - Base URL without an http(s) scheme
    pub fn validate(&self) -> Result<()> {
        if self.organization.trim().is_empty() || self.repository.trim().is_empty() {
            return Err(BgRemovalError::invalid_config(
                "Repository organization and name must not be empty",
            ));
        }
        if !(self.base_url.starts_with("https://") || self.base_url.starts_with("http://")) {
            return Err(BgRemovalError::invalid_config(format!(
                "Unsupported repository base URL: {}",
                self.base_url
            )));
        }
        Ok(())
    }

    fn resolve_base(&self) -> String {
        format!(
            "{}/{}/{}/resolve/main",
            self.base_url.trim_end_matches('/'),
            self.organization,
            self.repository
        )
    }

    /// URL of the variant's bulk archive
    #[must_use]
    pub fn archive_url(&self, variant: ModelVariant) -> String {
        format!("{}/{}", self.resolve_base(), variant.archive_file_name())
    }

    /// URL of a single file inside the variant's package
    #[must_use]
    pub fn package_file_url(&self, variant: ModelVariant, relative_path: &str) -> String {
        format!(
            "{}/{}/{}",
            self.resolve_base(),
            variant.package_file_name(),
            relative_path
        )
    }
}

/// Package manifest describing where the graph and weights live
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageManifest {
    /// Manifest format version
    #[serde(default = "PackageManifest::default_format_version")]
    pub format_version: u32,
    /// Graph file relative to the package root
    #[serde(default = "PackageManifest::default_model_path")]
    pub model_path: String,
    /// External weight files relative to the package root
    #[serde(default)]
    pub weights: Vec<String>,
}

impl Default for PackageManifest {
    fn default() -> Self {
        Self {
            format_version: Self::default_format_version(),
            model_path: Self::default_model_path(),
            weights: vec![SECONDARY_WEIGHTS_PATH.to_string()],
        }
    }
}

impl PackageManifest {
    fn default_format_version() -> u32 {
        1
    }

    fn default_model_path() -> String {
        PRIMARY_WEIGHTS_PATH.to_string()
    }

    /// Read the manifest of a package directory
    ///
    /// # Errors
    /// - Manifest missing or unreadable
    /// - Manifest is not valid JSON
    pub fn load(package_dir: &Path) -> Result<Self> {
        let manifest_path = package_dir.join(MANIFEST_PATH);
        let content = std::fs::read_to_string(&manifest_path).map_err(|e| {
            BgRemovalError::compilation_failed(
                package_dir,
                format!("cannot read manifest {}: {}", manifest_path.display(), e),
            )
        })?;
        serde_json::from_str(&content).map_err(|e| {
            BgRemovalError::compilation_failed(
                package_dir,
                format!("invalid manifest {}: {}", manifest_path.display(), e),
            )
        })
    }

    /// Resolve the graph file of a package
    ///
    /// A bare `.onnx` file is accepted as a package of one file.
    ///
    /// # Errors
    /// - Manifest errors
    /// - Graph file referenced by the manifest does not exist
    pub fn resolve_model_file(package: &Path) -> Result<PathBuf> {
        if package.is_file() {
            return Ok(package.to_path_buf());
        }

        let manifest = Self::load(package)?;
        let model_file = package.join(&manifest.model_path);
        if !model_file.is_file() {
            return Err(BgRemovalError::compilation_failed(
                package,
                format!("model file '{}' not found in package", manifest.model_path),
            ));
        }
        Ok(model_file)
    }
}
