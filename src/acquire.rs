//! Model acquisition: ensure a compiled artifact exists in the cache
//!
//! The acquirer walks the artifact state machine `Missing -> PackagePresent ->
//! CompiledPresent` for one variant inside one cache root:
//!
//! 1. A custom model that is already compiled is returned untouched. Any other
//!    custom model is compiled into the variant's compiled path (reused if present).
//! 2. A compiled artifact in the cache is a hit: one progress report at 1.0, no
//!    network or compiler activity.
//! 3. A package in the cache is compiled.
//! 4. Otherwise the package is downloaded, then compiled.
//!
//! Work on a given compiled path is serialized through a [`SingleFlight`] guard,
//! and the state is probed again after the guard is taken, so concurrent callers
//! inside one process never download or compile the same artifact twice.

use crate::cache::CacheRoot;
use crate::compile::ModelCompiler;
use crate::config::ModelVariant;
use crate::download::{DownloadStrategy, ModelDownloader};
use crate::error::{BgRemovalError, Result};
use crate::models::{is_compiled_artifact, ArtifactState};
use crate::services::progress::{AcquisitionStage, ProgressReporter, ProgressTracker};
use dashmap::DashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tokio::sync::{Mutex, OwnedMutexGuard};
use walkdir::WalkDir;

/// Guard granting exclusive work on one key at a time
///
/// Clones share the same lock table.
#[derive(Debug, Clone, Default)]
pub struct SingleFlight {
    locks: Arc<DashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl SingleFlight {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock table shared by every acquirer in the process
    #[must_use]
    pub fn process_wide() -> Self {
        static SHARED: OnceLock<SingleFlight> = OnceLock::new();
        SHARED.get_or_init(SingleFlight::new).clone()
    }

    /// Wait for exclusive access to `key`
    pub async fn acquire(&self, key: &Path) -> OwnedMutexGuard<()> {
        let lock = Arc::clone(
            self.locks
                .entry(key.to_path_buf())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        );
        lock.lock_owned().await
    }

    /// Number of keys that have been locked at least once
    #[must_use]
    pub fn key_count(&self) -> usize {
        self.locks.len()
    }
}

/// Ensures a compiled, executable model artifact exists
#[derive(Clone)]
pub struct ModelAcquirer {
    downloader: ModelDownloader,
    compiler: Arc<dyn ModelCompiler>,
    single_flight: SingleFlight,
}

impl ModelAcquirer {
    /// Create an acquirer sharing the process-wide single-flight table
    #[must_use]
    pub fn new(downloader: ModelDownloader, compiler: Arc<dyn ModelCompiler>) -> Self {
        Self {
            downloader,
            compiler,
            single_flight: SingleFlight::process_wide(),
        }
    }

    /// Use a dedicated single-flight table
    #[must_use]
    pub fn with_single_flight(mut self, single_flight: SingleFlight) -> Self {
        self.single_flight = single_flight;
        self
    }

    /// Acquirer over HTTP, zip extraction and the ONNX Runtime compiler
    ///
    /// # Errors
    /// - Failed to create HTTP client
    #[cfg(feature = "onnx")]
    pub fn from_config(config: &crate::config::RemovalConfig) -> Result<Self> {
        let transport = crate::download::HttpTransport::new(std::time::Duration::from_secs(
            config.request_timeout_secs,
        ))?;
        let downloader = ModelDownloader::new(
            Arc::new(transport),
            Arc::new(crate::archive::ZipExtractor),
            config.repository.clone(),
        );
        Ok(Self::new(
            downloader,
            Arc::new(crate::backends::onnx::OnnxCompiler::new()),
        ))
    }

    /// Return the path of a compiled artifact for `variant`, producing it if needed
    ///
    /// `progress` receives non-decreasing fractions and a final 1.0 on success.
    /// Reusing an existing compiled artifact reports exactly once, at 1.0.
    ///
    /// # Errors
    /// - `CacheUnavailable` when scratch space in the cache root cannot be created
    /// - `ModelDownloadFailed` when neither download strategy succeeds
    /// - `ModelCompilationFailed` when the compiler rejects the package
    pub async fn ensure_compiled_model(
        &self,
        variant: ModelVariant,
        cache: &CacheRoot,
        custom_model: Option<&Path>,
        progress: &dyn ProgressReporter,
    ) -> Result<PathBuf> {
        let mut tracker = ProgressTracker::new(progress);

        if let Some(custom) = custom_model {
            return self
                .ensure_custom_model(variant, cache, custom, &mut tracker)
                .await;
        }

        let compiled = cache.compiled_path(variant);
        if compiled.exists() {
            tracing::debug!(%variant, path = %compiled.display(), "Compiled model cache hit");
            tracker.finish();
            return Ok(compiled);
        }

        let _guard = self.single_flight.acquire(&cache.lock_key(variant)).await;

        match cache.artifact_state(variant) {
            ArtifactState::CompiledPresent => {
                tracing::debug!(
                    %variant,
                    path = %compiled.display(),
                    "Compiled model produced by a concurrent call"
                );
                tracker.finish();
                return Ok(compiled);
            },
            ArtifactState::PackagePresent => {
                tracing::info!(%variant, "Model package cached, compiling");
            },
            ArtifactState::Missing => {
                let strategy = self
                    .downloader
                    .download_package(variant, cache, &mut tracker)
                    .await?;
                if strategy == DownloadStrategy::PerFile {
                    tracing::debug!(%variant, "Package rebuilt from individual files");
                }
            },
        }

        self.compile_into(&cache.package_path(variant), &compiled, cache, &mut tracker)
            .await?;

        tracing::info!(%variant, path = %compiled.display(), "Compiled model ready");
        tracker.finish();
        Ok(compiled)
    }

    async fn ensure_custom_model(
        &self,
        variant: ModelVariant,
        cache: &CacheRoot,
        custom: &Path,
        tracker: &mut ProgressTracker<'_>,
    ) -> Result<PathBuf> {
        if is_compiled_artifact(custom) {
            tracing::debug!(path = %custom.display(), "Using precompiled custom model");
            tracker.finish();
            return Ok(custom.to_path_buf());
        }

        let compiled = cache.compiled_path(variant);
        let _guard = self.single_flight.acquire(&cache.lock_key(variant)).await;

        if compiled.exists() {
            tracing::debug!(
                path = %compiled.display(),
                "Reusing compiled artifact for custom model"
            );
            tracker.finish();
            return Ok(compiled);
        }

        if !custom.exists() {
            return Err(BgRemovalError::compilation_failed(
                custom,
                "custom model path does not exist",
            ));
        }

        tracing::info!(path = %custom.display(), "Compiling custom model");
        self.compile_into(custom, &compiled, cache, tracker).await?;
        tracker.finish();
        Ok(compiled)
    }

    async fn compile_into(
        &self,
        package: &Path,
        destination: &Path,
        cache: &CacheRoot,
        tracker: &mut ProgressTracker<'_>,
    ) -> Result<()> {
        tracker.enter(AcquisitionStage::Compiling);

        let scratch = tempfile::Builder::new()
            .prefix(".compile-")
            .tempdir_in(cache.path())
            .map_err(|e| {
                BgRemovalError::cache_io_error("create compilation directory", cache.path(), &e)
            })?;

        let start = instant::Instant::now();
        let output = self.compiler.compile(package, scratch.path()).await?;
        tracing::debug!(
            package = %package.display(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Compilation finished"
        );

        tracker.within(AcquisitionStage::Compiling, 1.0, "Installing compiled model");
        replace_artifact(&output, destination)
    }
}

/// Move a freshly compiled artifact to `destination`, replacing what is there
///
/// A file replacing a file uses a single rename, which replaces the destination
/// atomically on the platforms we support. Anything else is remove-then-move:
/// the old artifact is deleted before the new one is moved in, so a crash between
/// the two steps leaves neither. A later call then observes the artifact as not
/// compiled and compiles again.
///
/// # Errors
/// - `ModelCompilationFailed` when the artifact cannot be moved into place
pub fn replace_artifact(source: &Path, destination: &Path) -> Result<()> {
    if source.is_file() && !destination.is_dir() {
        if fs::rename(source, destination).is_ok() {
            return Ok(());
        }
        return fs::copy(source, destination)
            .map(|_| ())
            .map_err(|e| install_error(destination, &e));
    }

    if destination.exists() {
        let removal = if destination.is_dir() {
            fs::remove_dir_all(destination)
        } else {
            fs::remove_file(destination)
        };
        removal.map_err(|e| install_error(destination, &e))?;
    }

    if fs::rename(source, destination).is_err() {
        copy_recursively(source, destination).map_err(|e| install_error(destination, &e))?;
    }
    Ok(())
}

fn install_error(destination: &Path, error: &std::io::Error) -> BgRemovalError {
    BgRemovalError::compilation_failed(
        destination,
        format!("failed to install compiled artifact: {}", error),
    )
}

fn copy_recursively(source: &Path, destination: &Path) -> std::io::Result<()> {
    if source.is_file() {
        fs::copy(source, destination)?;
        return Ok(());
    }

    for entry in WalkDir::new(source) {
        let entry = entry.map_err(std::io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        let target = destination.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
