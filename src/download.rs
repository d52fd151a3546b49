//! Model package downloading
//!
//! The package of a variant is fetched from the model repository in one of two
//! ways. The bulk strategy downloads `<package>.zip` and extracts it. When the
//! archive is not published (HTTP 404) the downloader falls back to fetching the
//! package's constituent files one by one and rebuilds the directory locally.
//! Every write goes through a staging location inside the cache root, so the
//! package path only ever appears complete.

use crate::archive::ArchiveExtractor;
use crate::cache::CacheRoot;
use crate::config::ModelVariant;
use crate::error::{BgRemovalError, Result};
use crate::models::{ModelRepository, MANIFEST_PATH, PACKAGE_FILES};
use crate::services::progress::{AcquisitionStage, ProgressTracker};
use async_trait::async_trait;
use futures_util::stream::TryStreamExt;
use reqwest::{Client, StatusCode};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::io::StreamReader;

/// Callback receiving `(bytes_downloaded, total_bytes)` while a transfer runs
pub type ByteProgress<'a> = &'a mut (dyn FnMut(u64, Option<u64>) + Send);

/// Result of a single transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The resource was written to the destination
    Completed {
        /// Number of bytes written
        bytes: u64,
    },
    /// The remote reported the resource as missing; nothing was written
    NotFound,
}

/// Transfer mechanism used to fetch remote resources
#[async_trait]
pub trait ArtifactTransport: Send + Sync {
    /// Fetch `url` into `destination`
    ///
    /// Parent directories of `destination` are created as needed.
    ///
    /// # Errors
    /// - `ModelDownloadFailed` for any non-success status other than 404, and for
    ///   connection or stream failures
    /// - I/O errors while writing the destination
    async fn fetch(
        &self,
        url: &str,
        destination: &Path,
        on_bytes: ByteProgress<'_>,
    ) -> Result<FetchOutcome>;
}

/// HTTP transport backed by `reqwest`
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Create a transport with the given request timeout
    ///
    /// # Errors
    /// - Failed to create HTTP client
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                BgRemovalError::download_failed(format!("Failed to create HTTP client: {}", e))
            })?;
        Ok(Self::with_client(client))
    }

    /// Create a transport around an existing client
    #[must_use]
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ArtifactTransport for HttpTransport {
    async fn fetch(
        &self,
        url: &str,
        destination: &Path,
        on_bytes: ByteProgress<'_>,
    ) -> Result<FetchOutcome> {
        tracing::debug!(url, destination = %destination.display(), "Fetching");

        let response = self.client.get(url).send().await.map_err(|e| {
            BgRemovalError::download_failed(format!("Request to {} failed: {}", url, e))
        })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            tracing::debug!(url, "Remote resource not found");
            return Ok(FetchOutcome::NotFound);
        }
        if !status.is_success() {
            return Err(BgRemovalError::http_status_error(url, status.as_u16()));
        }

        let total_size = response.content_length();

        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| BgRemovalError::cache_io_error("create directory", parent, &e))?;
        }

        let mut file = tokio::fs::File::create(destination)
            .await
            .map_err(|e| BgRemovalError::cache_io_error("create file", destination, &e))?;

        let mut stream = StreamReader::new(
            response
                .bytes_stream()
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)),
        );

        let mut downloaded = 0u64;
        let mut buffer = vec![0; 64 * 1024];

        loop {
            let bytes_read = stream.read(&mut buffer).await.map_err(|e| {
                BgRemovalError::download_failed(format!("Failed to read {}: {}", url, e))
            })?;

            if bytes_read == 0 {
                break;
            }

            file.write_all(buffer.get(..bytes_read).unwrap_or(&[]))
                .await
                .map_err(|e| BgRemovalError::cache_io_error("write to file", destination, &e))?;

            downloaded += bytes_read as u64;
            on_bytes(downloaded, total_size);
        }

        file.flush()
            .await
            .map_err(|e| BgRemovalError::cache_io_error("flush file", destination, &e))?;

        tracing::debug!(
            url,
            bytes = downloaded,
            destination = %destination.display(),
            "Fetch completed"
        );
        Ok(FetchOutcome::Completed { bytes: downloaded })
    }
}

/// Strategy that produced the package during one acquisition call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadStrategy {
    /// Single archive transfer followed by extraction
    BulkArchive,
    /// Individual file transfers
    PerFile,
}

/// Downloads model packages into a cache root
#[derive(Clone)]
pub struct ModelDownloader {
    transport: Arc<dyn ArtifactTransport>,
    extractor: Arc<dyn ArchiveExtractor>,
    repository: ModelRepository,
}

impl ModelDownloader {
    #[must_use]
    pub fn new(
        transport: Arc<dyn ArtifactTransport>,
        extractor: Arc<dyn ArchiveExtractor>,
        repository: ModelRepository,
    ) -> Self {
        Self {
            transport,
            extractor,
            repository,
        }
    }

    /// Repository the downloader fetches from
    #[must_use]
    pub fn repository(&self) -> &ModelRepository {
        &self.repository
    }

    /// Download the variant's package into the cache root
    ///
    /// Tries the bulk archive first and falls back to per-file fetches when the
    /// archive is reported missing. On success the package directory exists at
    /// `cache.package_path(variant)`.
    ///
    /// # Errors
    /// - `ModelDownloadFailed` on a non-404 failure status, when a required file is
    ///   missing in the fallback, or when the extracted archive has no package
    /// - `CacheUnavailable` when staging space in the cache root cannot be created
    pub async fn download_package(
        &self,
        variant: ModelVariant,
        cache: &CacheRoot,
        tracker: &mut ProgressTracker<'_>,
    ) -> Result<DownloadStrategy> {
        let package_path = cache.package_path(variant);
        tracker.enter(AcquisitionStage::Downloading);

        tracing::info!(
            %variant,
            package = %package_path.display(),
            "Downloading model package"
        );

        if self.download_archive(variant, cache, tracker).await? {
            tracing::info!(%variant, "Model package downloaded from archive");
            return Ok(DownloadStrategy::BulkArchive);
        }

        tracing::info!(
            %variant,
            "Archive not available, fetching package files individually"
        );
        self.download_files(variant, cache, tracker).await?;
        tracing::info!(%variant, "Model package downloaded file by file");
        Ok(DownloadStrategy::PerFile)
    }

    /// Bulk strategy; `Ok(false)` when the archive does not exist remotely
    async fn download_archive(
        &self,
        variant: ModelVariant,
        cache: &CacheRoot,
        tracker: &mut ProgressTracker<'_>,
    ) -> Result<bool> {
        let url = self.repository.archive_url(variant);
        let archive_file = tempfile::Builder::new()
            .prefix(".download-")
            .suffix(".zip")
            .tempfile_in(cache.path())
            .map_err(|e| BgRemovalError::cache_io_error("create download file", cache.path(), &e))?
            .into_temp_path();

        let outcome = {
            let mut on_bytes = |downloaded: u64, total: Option<u64>| {
                if let Some(total) = total.filter(|t| *t > 0) {
                    tracker.within(
                        AcquisitionStage::Downloading,
                        downloaded as f32 / total as f32,
                        AcquisitionStage::Downloading.description(),
                    );
                }
            };
            self.transport.fetch(&url, &archive_file, &mut on_bytes).await
        };

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                close_temp_path(archive_file);
                return Err(e);
            },
        };

        if outcome == FetchOutcome::NotFound {
            close_temp_path(archive_file);
            return Ok(false);
        }

        tracker.enter(AcquisitionStage::Extracting);
        let extracted = self
            .extract_into_cache(&archive_file, variant, cache)
            .await;
        close_temp_path(archive_file);
        extracted?;

        tracker.within(
            AcquisitionStage::Extracting,
            1.0,
            AcquisitionStage::Extracting.description(),
        );
        Ok(true)
    }

    async fn extract_into_cache(
        &self,
        archive: &Path,
        variant: ModelVariant,
        cache: &CacheRoot,
    ) -> Result<()> {
        let package_path = cache.package_path(variant);
        let staging = staging_dir(cache, ".extract-")?;

        self.extractor.extract(archive, staging.path()).await?;

        let nested = staging.path().join(variant.package_file_name());
        if nested.is_dir() {
            move_into_place(&nested, &package_path)?;
        } else if staging.path().join(MANIFEST_PATH).is_file() {
            let staging_path = staging.keep();
            move_into_place(&staging_path, &package_path)?;
        } else {
            return Err(BgRemovalError::download_failed(format!(
                "Archive for {} does not contain '{}'",
                variant,
                variant.package_file_name()
            )));
        }

        if !package_path.exists() {
            return Err(BgRemovalError::download_failed(format!(
                "Package '{}' missing after extraction",
                package_path.display()
            )));
        }
        Ok(())
    }

    /// Fallback strategy: fetch each package file into a staging directory
    async fn download_files(
        &self,
        variant: ModelVariant,
        cache: &CacheRoot,
        tracker: &mut ProgressTracker<'_>,
    ) -> Result<()> {
        let staging = staging_dir(cache, ".files-")?;
        let file_count = PACKAGE_FILES.len() as f32;

        for (index, file) in PACKAGE_FILES.iter().enumerate() {
            let url = self.repository.package_file_url(variant, file.path);
            let destination = staging.path().join(file.path);
            let label = format!("Downloading {}", file.path);

            let outcome = {
                let mut on_bytes = |downloaded: u64, total: Option<u64>| {
                    if let Some(total) = total.filter(|t| *t > 0) {
                        let inner = (index as f32 + downloaded as f32 / total as f32) / file_count;
                        tracker.within(AcquisitionStage::Downloading, inner, &label);
                    }
                };
                self.transport.fetch(&url, &destination, &mut on_bytes).await
            };

            match (outcome, file.required) {
                (Ok(FetchOutcome::Completed { bytes }), _) => {
                    tracing::debug!(file = file.path, bytes, "Fetched package file");
                },
                (Ok(FetchOutcome::NotFound), true) => {
                    return Err(BgRemovalError::download_failed(format!(
                        "Required package file not found: {}",
                        url
                    )));
                },
                (Ok(FetchOutcome::NotFound), false) => {
                    tracing::debug!(file = file.path, "Optional package file not published");
                },
                (Err(e), true) => return Err(e),
                (Err(e), false) => {
                    tracing::warn!(file = file.path, error = %e, "Skipping optional package file");
                    let _ = fs::remove_file(&destination);
                },
            }

            tracker.within(
                AcquisitionStage::Downloading,
                (index as f32 + 1.0) / file_count,
                &label,
            );
        }

        let staging_path = staging.keep();
        move_into_place(&staging_path, &cache.package_path(variant))
    }
}

fn staging_dir(cache: &CacheRoot, prefix: &str) -> Result<tempfile::TempDir> {
    tempfile::Builder::new()
        .prefix(prefix)
        .tempdir_in(cache.path())
        .map_err(|e| BgRemovalError::cache_io_error("create staging directory", cache.path(), &e))
}

fn close_temp_path(path: tempfile::TempPath) {
    let shown = path.display().to_string();
    if let Err(e) = path.close() {
        tracing::warn!(path = %shown, error = %e, "Failed to remove temporary download");
    }
}

/// Move a staged package directory to its final location
///
/// Any stale directory at the destination is removed first. On failure the
/// source is removed so no staging directory is left behind.
fn move_into_place(source: &Path, destination: &Path) -> Result<()> {
    if destination.exists() {
        let removal = if destination.is_dir() {
            fs::remove_dir_all(destination)
        } else {
            fs::remove_file(destination)
        };
        removal.map_err(|e| {
            BgRemovalError::cache_io_error("remove stale package", destination, &e)
        })?;
    }

    if let Err(e) = fs::rename(source, destination) {
        let _ = fs::remove_dir_all(source);
        return Err(BgRemovalError::cache_io_error(
            "move package into cache",
            destination,
            &e,
        ));
    }
    Ok(())
}
