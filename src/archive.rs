//! Package archive extraction
//!
//! Bulk downloads arrive as a zip archive of the package directory. Extraction runs
//! on the blocking thread pool since the `zip` crate is synchronous.

use crate::error::{BgRemovalError, Result};
use async_trait::async_trait;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Unpacks a downloaded archive into a directory
#[async_trait]
pub trait ArchiveExtractor: Send + Sync {
    /// Extract `archive` into `destination`, creating it when missing
    ///
    /// # Errors
    /// - `ModelDownloadFailed` when the archive is unreadable or corrupt
    async fn extract(&self, archive: &Path, destination: &Path) -> Result<()>;
}

/// Zip archive extractor
#[derive(Debug, Default, Clone, Copy)]
pub struct ZipExtractor;

impl ZipExtractor {
    fn extract_blocking(archive: &Path, destination: &Path) -> Result<usize> {
        let file = File::open(archive)
            .map_err(|e| BgRemovalError::cache_io_error("open model archive", archive, &e))?;

        let mut zip = zip::ZipArchive::new(BufReader::new(file)).map_err(|e| {
            BgRemovalError::download_failed(format!(
                "Invalid model archive '{}': {}",
                archive.display(),
                e
            ))
        })?;

        std::fs::create_dir_all(destination).map_err(|e| {
            BgRemovalError::cache_io_error("create extraction directory", destination, &e)
        })?;

        let entries = zip.len();
        zip.extract(destination).map_err(|e| {
            BgRemovalError::download_failed(format!(
                "Failed to extract model archive '{}': {}",
                archive.display(),
                e
            ))
        })?;

        Ok(entries)
    }
}

#[async_trait]
impl ArchiveExtractor for ZipExtractor {
    async fn extract(&self, archive: &Path, destination: &Path) -> Result<()> {
        let archive_path: PathBuf = archive.to_path_buf();
        let destination_path: PathBuf = destination.to_path_buf();

        let entries = tokio::task::spawn_blocking(move || {
            Self::extract_blocking(&archive_path, &destination_path)
        })
        .await
        .map_err(|e| BgRemovalError::download_failed(format!("Extraction task failed: {}", e)))??;

        tracing::debug!(
            archive = %archive.display(),
            destination = %destination.display(),
            entries,
            "Extracted model archive"
        );
        Ok(())
    }
}
