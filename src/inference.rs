//! Execution engine abstraction

use crate::config::ComputeProfile;
use crate::error::Result;
use ndarray::Array4;
use std::collections::HashMap;
use std::path::Path;

// Use instant crate for cross-platform time compatibility
use instant::Duration;

/// Named output tensors returned by one engine invocation
pub type EngineOutputs = HashMap<String, Array4<f32>>;

/// Trait for inference backends
///
/// A backend loads one compiled artifact and is then reused for every call.
pub trait InferenceBackend: Send {
    /// Load the compiled model at `model_path`
    ///
    /// Returns the model loading time.
    ///
    /// # Errors
    /// - Model loading failures
    /// - Execution provider configuration errors
    fn initialize(&mut self, model_path: &Path, profile: ComputeProfile) -> Result<Duration>;

    /// Run the model on the input tensor
    ///
    /// # Errors
    /// - Backend not initialized
    /// - Engine failures during the run
    /// - Output tensors that cannot be extracted
    fn infer(&mut self, input: &Array4<f32>) -> Result<EngineOutputs>;

    /// Check if backend is initialized
    fn is_initialized(&self) -> bool;
}

/// Factory trait for creating inference backends
pub trait BackendFactory: Send + Sync {
    /// Create an uninitialized backend
    ///
    /// # Errors
    /// - Backend unavailable in this build
    fn create_backend(&self) -> Result<Box<dyn InferenceBackend>>;

    /// Short backend name for logging
    fn name(&self) -> &'static str;
}
