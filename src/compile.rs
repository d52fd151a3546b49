//! Package compilation seam
//!
//! A compiler turns a package directory (or a bare graph file) into a single
//! optimized artifact inside a scratch directory. Relocating that artifact into
//! the cache is the caller's job.

use crate::error::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Converts a model package into its compiled form
#[async_trait]
pub trait ModelCompiler: Send + Sync {
    /// Compile `package` and return the path of the compiled artifact
    ///
    /// The returned path lives inside `scratch_dir`.
    ///
    /// # Errors
    /// - `ModelCompilationFailed` carrying the underlying cause
    async fn compile(&self, package: &Path, scratch_dir: &Path) -> Result<PathBuf>;
}
