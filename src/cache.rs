//! Cache root resolution and cache directory management
//!
//! The cache root is an explicit value handed to every acquisition call. Without a
//! caller override it lives under the platform cache directory, scoped by the
//! repository's organization and name:
//! - Linux: `~/.cache/<organization>/<repository>/`
//! - macOS: `~/Library/Caches/<organization>/<repository>/`
//! - Windows: `%LOCALAPPDATA%/<organization>/<repository>/`

use crate::config::ModelVariant;
use crate::error::{BgRemovalError, Result};
use crate::models::{ArtifactState, ModelRepository, COMPILED_EXTENSION, PACKAGE_EXTENSION};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Outcome of clearing a cache root
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearOutcome {
    /// The directory existed and was removed
    Cleared,
    /// Nothing existed to delete
    AlreadyEmpty,
}

/// Kind of a cached artifact entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Package,
    Compiled,
}

/// Information about an artifact found in the cache root
#[derive(Debug, Clone)]
pub struct CachedArtifactInfo {
    /// Entry name inside the cache root
    pub name: String,
    /// Full path of the entry
    pub path: PathBuf,
    /// Package or compiled artifact
    pub kind: ArtifactKind,
    /// Total size in bytes
    pub size_bytes: u64,
}

/// Resolves and creates the cache root
pub struct CacheLocationResolver;

impl CacheLocationResolver {
    /// Resolve the cache root for a repository
    ///
    /// An override is created recursively when missing and returned unchanged.
    /// Otherwise the default location under the platform cache directory is used.
    ///
    /// # Errors
    /// - `CacheUnavailable` when the platform cache directory is unknown or the
    ///   directory cannot be created
    pub fn resolve(override_dir: Option<&Path>, repository: &ModelRepository) -> Result<CacheRoot> {
        let path = match override_dir {
            Some(dir) => dir.to_path_buf(),
            None => {
                let platform_root = dirs::cache_dir().ok_or_else(|| {
                    BgRemovalError::cache_unavailable(
                        "Failed to determine platform cache directory. Provide a cache directory override.",
                    )
                })?;
                Self::default_cache_path(
                    &platform_root,
                    &repository.organization,
                    &repository.repository,
                )
            },
        };

        CacheRoot::create(path)
    }

    /// Compute the default cache path
    ///
    /// Pure function of the platform cache root and the repository coordinates.
    #[must_use]
    pub fn default_cache_path(platform_root: &Path, organization: &str, repository: &str) -> PathBuf {
        platform_root.join(organization).join(repository)
    }
}

/// An existing, writable cache directory
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheRoot {
    path: PathBuf,
    canonical: PathBuf,
}

impl CacheRoot {
    /// Use `path` as cache root, creating it when missing
    ///
    /// # Errors
    /// - `CacheUnavailable` when the directory cannot be created, or the path
    ///   exists but is not a directory
    pub fn create<P: Into<PathBuf>>(path: P) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            fs::create_dir_all(&path)
                .map_err(|e| BgRemovalError::cache_io_error("create cache directory", &path, &e))?;
            tracing::debug!(cache_dir = %path.display(), "Created cache directory");
        } else if !path.is_dir() {
            return Err(BgRemovalError::cache_unavailable(format!(
                "Cache path '{}' exists but is not a directory",
                path.display()
            )));
        }
        let canonical = fs::canonicalize(&path)
            .map_err(|e| BgRemovalError::cache_io_error("resolve cache directory", &path, &e))?;
        Ok(Self { path, canonical })
    }

    /// The cache directory path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the variant's package directory
    #[must_use]
    pub fn package_path(&self, variant: ModelVariant) -> PathBuf {
        self.path.join(variant.package_file_name())
    }

    /// Path of the variant's compiled artifact
    #[must_use]
    pub fn compiled_path(&self, variant: ModelVariant) -> PathBuf {
        self.path.join(variant.compiled_file_name())
    }

    /// Identity of the variant's compiled artifact for single-flight locking
    ///
    /// Built from the canonical cache directory, so every spelling of the same
    /// root (relative segments, symlinks) maps to one key.
    #[must_use]
    pub fn lock_key(&self, variant: ModelVariant) -> PathBuf {
        self.canonical.join(variant.compiled_file_name())
    }

    /// Current on-disk state of the variant's artifact
    #[must_use]
    pub fn artifact_state(&self, variant: ModelVariant) -> ArtifactState {
        ArtifactState::probe(&self.package_path(variant), &self.compiled_path(variant))
    }

    /// List package and compiled artifacts present in the cache root
    ///
    /// # Errors
    /// - Failed to read the cache directory
    pub fn scan(&self) -> Result<Vec<CachedArtifactInfo>> {
        let mut artifacts = Vec::new();

        if !self.path.exists() {
            return Ok(artifacts);
        }

        let entries = fs::read_dir(&self.path)
            .map_err(|e| BgRemovalError::cache_io_error("read cache directory", &self.path, &e))?;

        for entry in entries.flatten() {
            let path = entry.path();
            let kind = match path.extension().and_then(|ext| ext.to_str()) {
                Some(PACKAGE_EXTENSION) => ArtifactKind::Package,
                Some(COMPILED_EXTENSION) => ArtifactKind::Compiled,
                _ => continue,
            };

            artifacts.push(CachedArtifactInfo {
                name: entry.file_name().to_string_lossy().into_owned(),
                size_bytes: directory_size(&path),
                path,
                kind,
            });
        }

        artifacts.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(artifacts)
    }

    /// Recursively delete the cache root
    ///
    /// # Errors
    /// - `CacheUnavailable` when removal fails
    pub fn clear(self) -> Result<ClearOutcome> {
        clear_cache_dir(&self.path)
    }
}

/// Recursively delete a cache directory
///
/// Reports whether anything existed to delete.
///
/// # Errors
/// - `CacheUnavailable` when removal fails
pub fn clear_cache_dir(path: &Path) -> Result<ClearOutcome> {
    if !path.exists() {
        tracing::debug!(cache_dir = %path.display(), "Cache already empty");
        return Ok(ClearOutcome::AlreadyEmpty);
    }

    let removal = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    removal.map_err(|e| BgRemovalError::cache_io_error("clear cache directory", path, &e))?;

    tracing::info!(cache_dir = %path.display(), "Cleared model cache");
    Ok(ClearOutcome::Cleared)
}

/// Total size in bytes of a file or directory tree
#[must_use]
pub fn directory_size(path: &Path) -> u64 {
    WalkDir::new(path)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.metadata().ok())
        .map(|metadata| metadata.len())
        .sum()
}

/// Format file size in human-readable format
#[must_use]
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS.get(unit_index).unwrap_or(&"B"))
    } else {
        format!("{:.1} {}", size, UNITS.get(unit_index).unwrap_or(&"B"))
    }
}
